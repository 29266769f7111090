//! Denoiser interface and the blended guidance score
//!
//! The relaxation walks along a score field assembled from two branches: the
//! unknown region follows the denoiser's clean-sample estimate, while the
//! known region is pulled toward the user-provided target, with a coupling
//! term that keeps both regions mutually consistent across the mask boundary.

use burn::prelude::*;

use burn_inpaint_core::{mask, InpaintError};

use crate::schedule::{ScheduleFamily, TimeTriple};

/// Denoiser output for one invocation.
pub struct ModelPrediction<B: Backend> {
    /// Clean-sample estimate at the queried noise level
    pub denoised: Tensor<B, 4>,
    /// Detached estimate used only by the known-branch coupling term.
    ///
    /// Models without a separate strongly-guided pass return the denoised
    /// estimate here as well.
    pub auxiliary: Tensor<B, 4>,
}

/// Denoising model driven by the inpainting sampler.
///
/// Implementations receive samples in their own native noise-schedule
/// convention; the sampler performs all parameterization changes.
pub trait InpaintModel<B: Backend> {
    /// Model-specific conditioning passed through unchanged.
    type Options;

    /// Predict the clean sample for `sample` at `noise_level`.
    fn predict(
        &self,
        sample: Tensor<B, 4>,
        noise_level: Tensor<B, 1>,
        options: &Self::Options,
        seed: u64,
    ) -> Result<ModelPrediction<B>, InpaintError>;

    /// Advance the known target to noise level `sigma` in the ambient
    /// convention, reusing `noise_residual` so the injected noise matches the
    /// outer loop's trajectory.
    fn noise_known_region(
        &self,
        sample: Tensor<B, 4>,
        sigma: Tensor<B, 1>,
        noise_residual: Tensor<B, 4>,
        known_target: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>, InpaintError>;
}

/// Frozen view of everything the score field depends on at one noise level.
///
/// Rebuilt per outer step; borrowed by every inner relaxation iteration.
pub struct ScoreEstimator<'a, B: Backend, M: InpaintModel<B>> {
    model: &'a M,
    known: &'a Tensor<B, 4>,
    mask_weights: &'a Tensor<B, 4>,
    times: &'a TimeTriple<B>,
    family: ScheduleFamily,
    coupling: f32,
    options: &'a M::Options,
    seed: u64,
}

impl<'a, B: Backend, M: InpaintModel<B>> ScoreEstimator<'a, B, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: &'a M,
        known: &'a Tensor<B, 4>,
        mask_weights: &'a Tensor<B, 4>,
        times: &'a TimeTriple<B>,
        family: ScheduleFamily,
        coupling: f32,
        options: &'a M::Options,
        seed: u64,
    ) -> Self {
        Self {
            model,
            known,
            mask_weights,
            times,
            family,
            coupling,
            options,
            seed,
        }
    }

    pub fn times(&self) -> &TimeTriple<B> {
        self.times
    }

    /// Blended guidance score at `x_t` (variance-preserving convention).
    ///
    /// Unknown branch: pull toward the denoiser's clean estimate. Known
    /// branch: pull toward the known target with strength `1 + coupling`,
    /// minus a `coupling`-weighted pull toward the clean estimate so the two
    /// attractions stay balanced at the boundary.
    pub fn score(&self, x_t: &Tensor<B, 4>) -> Result<Tensor<B, 4>, InpaintError> {
        let ambient = self.family.from_relaxed(x_t.clone(), self.times);
        let level = self.family.native_level(self.times);
        let prediction = self.model.predict(ambient, level, self.options, self.seed)?;

        let unknown = prediction.denoised - x_t.clone();
        let known = (x_t.clone() - self.known.clone()) * (-(1.0 + self.coupling))
            + (x_t.clone() - prediction.auxiliary) * self.coupling;

        Ok(mask::blend(known, unknown, self.mask_weights))
    }

    /// Clean-sample estimate consistent with the blended score.
    pub fn denoised(&self, x_t: &Tensor<B, 4>) -> Result<Tensor<B, 4>, InpaintError> {
        Ok(x_t.clone() + self.score(x_t)?)
    }
}
