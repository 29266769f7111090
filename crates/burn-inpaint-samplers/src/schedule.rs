//! Noise-schedule parameterizations
//!
//! The relaxation loop operates in the variance-preserving (VP) convention.
//! The outer loop may hand over samples in any of three equivalent
//! conventions; the family enum converts once at the sampler boundary.

use burn::prelude::*;

use burn_inpaint_core::InpaintError;

/// Noise-schedule family of the ambient sample.
///
/// Dispatched once at sampler entry; the inner relaxation always runs in the
/// variance-preserving convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleFamily {
    /// Ambient samples already use the variance-preserving convention
    #[default]
    VariancePreserving,
    /// Ambient samples are variance-exploding: `x = x0 + sigma * eps`
    VarianceExploding,
    /// Ambient samples follow the flow-matching convention:
    /// `x = (1 - t) * x0 + t * eps`
    FlowMatching,
}

/// Per-batch position on the noise schedule under three equivalent
/// parameterizations.
///
/// Exactly one member is authoritative depending on the model family; the
/// constructors derive the other two.
#[derive(Debug, Clone)]
pub struct TimeTriple<B: Backend> {
    /// Variance-exploding noise scale
    pub sigma: Tensor<B, 1>,
    /// Cumulative signal retention ᾱₜ
    pub abt: Tensor<B, 1>,
    /// Flow-matching time
    pub flow_t: Tensor<B, 1>,
}

impl<B: Backend> TimeTriple<B> {
    /// Build from already-derived values.
    pub fn new(sigma: Tensor<B, 1>, abt: Tensor<B, 1>, flow_t: Tensor<B, 1>) -> Self {
        Self { sigma, abt, flow_t }
    }

    /// Sigma authoritative: `abt = 1 / (1 + sigma^2)`, `t = sigma / (1 + sigma)`.
    pub fn from_sigma(sigma: Tensor<B, 1>) -> Self {
        let abt = (sigma.clone().powi_scalar(2) + 1.0).recip();
        let flow_t = sigma.clone() / (sigma.clone() + 1.0);
        Self { sigma, abt, flow_t }
    }

    /// Signal fraction authoritative: `sigma = sqrt((1 - abt) / abt)`.
    pub fn from_signal_fraction(abt: Tensor<B, 1>) -> Self {
        let one_minus = abt.clone().neg() + 1.0;
        let sigma = (one_minus.clone() / abt.clone()).sqrt();
        let flow_t = one_minus.clone().sqrt() / (abt.clone().sqrt() + one_minus.sqrt());
        Self { sigma, abt, flow_t }
    }

    /// Flow time authoritative: `sigma = t / (1 - t)`.
    pub fn from_flow_time(flow_t: Tensor<B, 1>) -> Self {
        let one_minus = flow_t.clone().neg() + 1.0;
        let sigma = flow_t.clone() / one_minus.clone();
        let abt = one_minus.clone().powi_scalar(2)
            / (one_minus.powi_scalar(2) + flow_t.clone().powi_scalar(2));
        Self { sigma, abt, flow_t }
    }

    /// Check the per-batch lengths against the sample batch size.
    pub fn validate(&self, batch: usize) -> Result<(), InpaintError> {
        for len in [
            self.sigma.dims()[0],
            self.abt.dims()[0],
            self.flow_t.dims()[0],
        ] {
            if len != batch && len != 1 {
                return Err(InpaintError::BatchMismatch {
                    sample: batch,
                    schedule: len,
                });
            }
        }
        Ok(())
    }
}

/// Reshape a per-batch scalar tensor to `[n, 1, 1, 1]` for broadcasting.
pub fn per_batch<B: Backend>(values: &Tensor<B, 1>) -> Tensor<B, 4> {
    let [n] = values.dims();
    values.clone().reshape([n, 1, 1, 1])
}

impl ScheduleFamily {
    /// Convert an ambient sample into the variance-preserving convention.
    pub fn to_relaxed<B: Backend>(self, x: Tensor<B, 4>, times: &TimeTriple<B>) -> Tensor<B, 4> {
        match self {
            ScheduleFamily::VariancePreserving => x,
            ScheduleFamily::VarianceExploding => x / ve_scale(times),
            ScheduleFamily::FlowMatching => x * flow_scale(times),
        }
    }

    /// Convert a variance-preserving sample back to the ambient convention.
    ///
    /// The ambient convention is also the denoiser's native one, so this
    /// conversion serves both the outer-loop boundary and the per-score model
    /// invocation.
    pub fn from_relaxed<B: Backend>(self, x_t: Tensor<B, 4>, times: &TimeTriple<B>) -> Tensor<B, 4> {
        match self {
            ScheduleFamily::VariancePreserving => x_t,
            ScheduleFamily::VarianceExploding => x_t * ve_scale(times),
            ScheduleFamily::FlowMatching => x_t / flow_scale(times),
        }
    }

    /// Noise level the denoiser expects for this family.
    pub fn native_level<B: Backend>(self, times: &TimeTriple<B>) -> Tensor<B, 1> {
        match self {
            ScheduleFamily::FlowMatching => times.flow_t.clone(),
            _ => times.sigma.clone(),
        }
    }
}

/// `sqrt(1 + sigma^2)`, the VE-to-VP scale.
fn ve_scale<B: Backend>(times: &TimeTriple<B>) -> Tensor<B, 4> {
    (per_batch(&times.sigma).powi_scalar(2) + 1.0).sqrt()
}

/// `sqrt(abt) + sqrt(1 - abt)`, the flow-to-VP scale.
fn flow_scale<B: Backend>(times: &TimeTriple<B>) -> Tensor<B, 4> {
    let abt = per_batch(&times.abt);
    abt.clone().sqrt() + (abt.neg() + 1.0).sqrt()
}
