//! Mask blending for two-branch (known/unknown) latents
//!
//! A mask value of 1 selects the known branch, 0 the unknown branch. Branch
//! quantities are only ever combined through the mask, never mixed
//! arithmetically.

use burn::prelude::*;

use crate::error::InpaintError;

/// Blend two branch tensors: `unknown * (1 - mask) + known * mask`.
pub fn blend<B: Backend, const D: usize>(
    known: Tensor<B, D>,
    unknown: Tensor<B, D>,
    mask: &Tensor<B, D>,
) -> Tensor<B, D> {
    unknown * complement(mask) + known * mask.clone()
}

/// `1 - mask`, the unknown-branch weight.
pub fn complement<B: Backend, const D: usize>(mask: &Tensor<B, D>) -> Tensor<B, D> {
    mask.clone().neg() + 1.0
}

/// Check that `mask` broadcasts onto `sample`: same rank, each dim equal or 1.
pub fn validate_broadcast(sample: &[usize], mask: &[usize]) -> Result<(), InpaintError> {
    let compatible = sample.len() == mask.len()
        && sample.iter().zip(mask).all(|(&s, &m)| m == s || m == 1);
    if compatible {
        Ok(())
    } else {
        Err(InpaintError::ShapeMismatch {
            expected: sample.to_vec(),
            actual: mask.to_vec(),
        })
    }
}
