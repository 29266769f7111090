//! Error taxonomy for the inpainting sampler

use thiserror::Error;

/// Errors surfaced by the inpainting sampler.
///
/// Shape problems are fatal and raised before any numerical work starts.
/// Denoiser failures are propagated unchanged; the sampler has no fallback
/// prediction source and performs no retries. A degenerate step size is not
/// an error (the iterator takes an explicit no-op path instead).
#[derive(Error, Debug)]
pub enum InpaintError {
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("batch size mismatch: sample has {sample}, schedule has {schedule}")]
    BatchMismatch { sample: usize, schedule: usize },

    #[error("model error: {0}")]
    Model(#[from] Box<dyn std::error::Error + Send + Sync>),
}
