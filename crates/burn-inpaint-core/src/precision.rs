//! Scoped full-precision arithmetic
//!
//! The exponential coefficients of the exact Langevin propagator lose
//! accuracy quickly in reduced-precision floats at extreme noise levels.
//! These helpers lift a block of tensor arithmetic to at least `f32` and
//! hand the result back in the ambient dtype.

use burn::prelude::*;
use burn::tensor::{DType, FloatDType};

/// Float dtype of `tensor`'s elements.
pub fn float_dtype<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> FloatDType {
    match tensor.dtype() {
        DType::F64 => FloatDType::F64,
        DType::F16 => FloatDType::F16,
        DType::BF16 => FloatDType::BF16,
        _ => FloatDType::F32,
    }
}

/// Cast to full precision. `f64` tensors pass through unchanged.
pub fn promote<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    match tensor.dtype() {
        DType::F64 => tensor,
        _ => tensor.cast(FloatDType::F32),
    }
}

/// Return a tensor to the given ambient dtype.
pub fn demote<B: Backend, const D: usize>(tensor: Tensor<B, D>, dtype: FloatDType) -> Tensor<B, D> {
    tensor.cast(dtype)
}

/// Run `f` at full precision and cast the result back on return.
///
/// The ambient dtype is captured before the promotion, so every exit path
/// restores it.
pub fn with_full_precision<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    f: impl FnOnce(Tensor<B, D>) -> Tensor<B, D>,
) -> Tensor<B, D> {
    let ambient = float_dtype(&tensor);
    demote(f(promote(tensor)), ambient)
}
