//! Per-branch step coefficients for the relaxation loop
//!
//! Each inner iteration advances the known and unknown branches with their
//! own time increment, friction, drift-anchor scaling, and diffusion
//! magnitude. The coefficients are derived per batch element from the
//! noise-schedule triple and blended through the mask before use.

use burn::prelude::*;
use burn::tensor::ElementConversion;

use burn_inpaint_core::mask;

use crate::sampler::InpaintSamplerConfig;
use crate::schedule::{per_batch, TimeTriple};

/// Per-branch coefficients, shaped `[n, 1, 1, 1]` for broadcasting.
///
/// Increments are per inner iteration; the iterator splits them
/// symmetrically around its score re-evaluation.
pub struct BranchCoefficients<B: Backend> {
    pub dt_unknown: Tensor<B, 4>,
    pub dt_known: Tensor<B, 4>,
    pub friction_unknown: Tensor<B, 4>,
    pub friction_known: Tensor<B, 4>,
    pub anchor_scale_unknown: Tensor<B, 4>,
    pub anchor_scale_known: Tensor<B, 4>,
    pub diffusion_unknown: Tensor<B, 4>,
    pub diffusion_known: Tensor<B, 4>,
}

/// Mask-blended view of the branch coefficients.
pub struct BlendedCoefficients<B: Backend> {
    pub dt: Tensor<B, 4>,
    pub friction: Tensor<B, 4>,
    pub anchor_scale: Tensor<B, 4>,
    pub diffusion: Tensor<B, 4>,
}

/// Derive the per-branch coefficients at the current noise level.
///
/// `step_size` must already be rescaled by `(1 - abt)`, so the inner-loop
/// increments vanish as the schedule approaches the noise-free endpoint.
pub fn branch_coefficients<B: Backend>(
    config: &InpaintSamplerConfig,
    step_size: &Tensor<B, 4>,
    times: &TimeTriple<B>,
) -> BranchCoefficients<B> {
    let abt = per_batch(&times.abt);
    let one_minus_abt = mask::complement(&abt);

    // halved increments, unit weight for the unknown branch, beta for known
    let dt_unknown = step_size.clone();
    let dt_known = step_size.clone() * config.branch_damping;

    // friction^2-scaled; the branch weight cancels against the increment and
    // the remaining factor is halved to match the denoise/add-noise cadence
    // of the outer loop
    let friction =
        step_size.clone().recip() * (config.friction.powi(2) * config.step_size / 0.2);

    // increment-independent drift-anchor scalings
    let anchor_scale_unknown = one_minus_abt.clone().recip();
    let anchor_scale_known = one_minus_abt.recip() * (1.0 + config.coupling);

    // constant magnitude; the noise-scaled form is an opt-in variant
    let diffusion = if config.noise_scaled_diffusion {
        ((per_batch(&times.sigma).powi_scalar(2) + 1.0) * 2.0).sqrt()
    } else {
        step_size.ones_like() * std::f32::consts::SQRT_2
    };

    BranchCoefficients {
        dt_unknown,
        dt_known,
        friction_unknown: friction.clone(),
        friction_known: friction,
        anchor_scale_unknown,
        anchor_scale_known,
        diffusion_unknown: diffusion.clone(),
        diffusion_known: diffusion,
    }
}

impl<B: Backend> BranchCoefficients<B> {
    /// Mean unknown-branch increment; a value <= 0 selects the no-op path.
    pub fn mean_unknown_dt(&self) -> f32 {
        self.dt_unknown.clone().mean().into_scalar().elem()
    }

    /// Blend every coefficient pair through the mask.
    pub fn blended(&self, mask_weights: &Tensor<B, 4>) -> BlendedCoefficients<B> {
        BlendedCoefficients {
            dt: mask::blend(self.dt_known.clone(), self.dt_unknown.clone(), mask_weights),
            friction: mask::blend(
                self.friction_known.clone(),
                self.friction_unknown.clone(),
                mask_weights,
            ),
            anchor_scale: mask::blend(
                self.anchor_scale_known.clone(),
                self.anchor_scale_unknown.clone(),
                mask_weights,
            ),
            diffusion: mask::blend(
                self.diffusion_known.clone(),
                self.diffusion_unknown.clone(),
                mask_weights,
            ),
        }
    }
}
