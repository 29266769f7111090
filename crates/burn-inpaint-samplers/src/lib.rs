//! Constrained Langevin inpainting for diffusion samplers
//!
//! Fills the unknown region of a partially known latent so that the result is
//! consistent with both the known pixels and the denoiser's learned
//! distribution. At each outer denoising step the sampler runs several inner
//! iterations of a damped stochastic relaxation (a constrained Langevin walk)
//! in the variance-preserving parameterization, integrating the linearized
//! dynamics exactly between score re-evaluations, then hands the denoised,
//! constraint-satisfying estimate back to the outer loop.

pub mod langevin;
pub mod oscillator;
pub mod sampler;
pub mod schedule;
pub mod score;
pub mod steps;

pub use langevin::{relax_step, LangevinState};
pub use oscillator::HarmonicOscillator;
pub use sampler::{InpaintSamplerConfig, LangevinInpaintSampler};
pub use schedule::{per_batch, ScheduleFamily, TimeTriple};
pub use score::{InpaintModel, ModelPrediction, ScoreEstimator};
pub use steps::{branch_coefficients, BlendedCoefficients, BranchCoefficients};
