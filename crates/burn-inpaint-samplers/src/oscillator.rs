//! Exact integrator for the damped stochastic harmonic oscillator
//!
//! Advances the linear system
//!
//! ```text
//! dx = v dt
//! dv = -Γ (v + A (x - C)) dt + sqrt(2Γ) D dW
//! ```
//!
//! over one step using the closed-form (matrix-exponential) solution and the
//! exact per-step Gaussian covariance, instead of an Euler discretization.
//! For a fixed linearization this eliminates step-size bias entirely; the
//! nonlinear score is re-linearized between steps by the Langevin iterator.
//! The stationary distribution in `x` is Gaussian centered at the anchor `C`
//! with precision proportional to `A`.

use burn::prelude::*;
use burn::tensor::Distribution;

/// Absolute threshold separating the over/under/critically damped branches.
const DAMPING_EPS: f32 = 1e-6;
/// Floor for variance denominators.
const VAR_FLOOR: f32 = 1e-20;
/// Floor for standard-deviation denominators.
const STD_FLOOR: f32 = 1e-10;

/// Constant-coefficient damped oscillator with additive noise.
///
/// Friction, stiffness, and diffusion must share one broadcast shape; the
/// anchor, sample, and momentum may carry additional broadcast dimensions.
pub struct HarmonicOscillator<B: Backend> {
    friction: Tensor<B, 4>,
    stiffness_scale: Tensor<B, 4>,
    anchor: Tensor<B, 4>,
    diffusion: Tensor<B, 4>,
}

impl<B: Backend> HarmonicOscillator<B> {
    pub fn new(
        friction: Tensor<B, 4>,
        stiffness_scale: Tensor<B, 4>,
        anchor: Tensor<B, 4>,
        diffusion: Tensor<B, 4>,
    ) -> Self {
        Self {
            friction,
            stiffness_scale,
            anchor,
            diffusion,
        }
    }

    /// Advance `(x, v)` exactly over `dt`.
    ///
    /// A missing momentum is drawn from the stationary momentum distribution
    /// `N(0, D^2)`.
    pub fn advance(
        &self,
        x: Tensor<B, 4>,
        v: Option<Tensor<B, 4>>,
        dt: Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let v = v.unwrap_or_else(|| {
            x.random_like(Distribution::Normal(0.0, 1.0)) * self.diffusion.clone()
        });

        let (phi11, phi12, phi21, phi22) = self.transition(&dt);

        // transported mean, measured as displacement from the anchor
        let z = x.clone() - self.anchor.clone();
        let mean_x =
            self.anchor.clone() + phi11.clone() * z.clone() + phi12.clone() * v.clone();
        let mean_v = phi21.clone() * z + phi22.clone() * v;

        // exact step covariance: Σ(dt) = Σ∞ - Φ Σ∞ Φᵀ,
        // Σ∞ = diag(D²/(ΓA), D²)
        let d2 = self.diffusion.clone().powi_scalar(2);
        let w2 = self.friction.clone() * self.stiffness_scale.clone();
        let var_x_inf = d2.clone() / w2;
        let var_v_inf = d2;

        let cov_xx = ((phi11.clone().powi_scalar(2).neg() + 1.0) * var_x_inf.clone()
            - phi12.clone().powi_scalar(2) * var_v_inf.clone())
        .clamp_min(0.0);
        let cov_xv = (phi11 * phi21.clone() * var_x_inf.clone()
            + phi12 * phi22.clone() * var_v_inf.clone())
        .neg();
        let cov_vv = ((phi22.powi_scalar(2).neg() + 1.0) * var_v_inf
            - phi21.powi_scalar(2) * var_x_inf)
            .clamp_min(0.0);

        // elementwise Cholesky factor of the 2x2 covariance
        let std_x = cov_xx.clone().sqrt();
        let cross = cov_xv.clone() / std_x.clone().clamp_min(STD_FLOOR);
        let conditional =
            (cov_vv - cov_xv.clone().powi_scalar(2) / cov_xx.clamp_min(VAR_FLOOR)).clamp_min(0.0);

        let n1 = mean_x.random_like(Distribution::Normal(0.0, 1.0));
        let n2 = mean_v.random_like(Distribution::Normal(0.0, 1.0));

        let x_new = mean_x + std_x * n1.clone();
        let v_new = mean_v + cross * n1 + conditional.sqrt() * n2;
        (x_new, v_new)
    }

    /// Entries of `exp(M dt)` for `M = [[0, 1], [-ΓA, -Γ]]`.
    ///
    /// Damped cosh/sinh basis with per-element branch selection. In the
    /// overdamped branch the decay rate dominates the growth rate, so every
    /// exponential argument is <= 0 and the entries cannot overflow.
    fn transition(
        &self,
        dt: &Tensor<B, 4>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        let half_g = self.friction.clone() / 2.0;
        let w2 = self.friction.clone() * self.stiffness_scale.clone();
        let disc = half_g.clone().powi_scalar(2) - w2.clone();
        let rate = disc.clone().abs().sqrt();
        let rate_safe = rate.clone().clamp_min(DAMPING_EPS);

        let decay = (half_g.clone() * dt.clone()).neg().exp();

        // critically damped fallback: cosh -> 1, sinh(r dt)/r -> dt
        let mut damped_cos = decay.clone();
        let mut damped_sinc = decay.clone() * dt.clone();

        // overdamped
        let grow = ((rate.clone() - half_g.clone()) * dt.clone()).exp();
        let shrink = ((rate.clone() + half_g.clone()) * dt.clone()).neg().exp();
        let over = disc.clone().greater_elem(DAMPING_EPS);
        damped_cos = damped_cos.mask_where(over.clone(), (grow.clone() + shrink.clone()) / 2.0);
        damped_sinc =
            damped_sinc.mask_where(over, (grow - shrink) / 2.0 / rate_safe.clone());

        // underdamped
        let arg = rate * dt.clone();
        let under = disc.lower_elem(-DAMPING_EPS);
        damped_cos = damped_cos.mask_where(under.clone(), decay.clone() * arg.clone().cos());
        damped_sinc = damped_sinc.mask_where(under, decay * arg.sin() / rate_safe);

        let phi11 = damped_cos.clone() + half_g.clone() * damped_sinc.clone();
        let phi12 = damped_sinc.clone();
        let phi21 = (w2 * damped_sinc.clone()).neg();
        let phi22 = damped_cos - half_g * damped_sinc;
        (phi11, phi12, phi21, phi22)
    }
}
