//! Shared tensor utilities for constrained inpainting samplers
//!
//! Mask blending for two-branch (known/unknown) latents, the sampler error
//! taxonomy, and scoped full-precision arithmetic.

pub mod error;
pub mod mask;
pub mod precision;

pub use error::InpaintError;
pub use mask::{blend, complement, validate_broadcast};
pub use precision::{demote, float_dtype, promote, with_full_precision};
