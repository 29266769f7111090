//! One inner iteration of the constrained Langevin relaxation
//!
//! The walk follows underdamped Langevin dynamics whose drift is linearized
//! around the current score evaluation. Each iteration advances the linear
//! system exactly with [`HarmonicOscillator`], then corrects the momentum for
//! the drift-target change measured at the midpoint. The first iteration has
//! no previous target to difference against and takes a single step from a
//! stationary momentum draw.

use burn::prelude::*;

use burn_inpaint_core::precision::{self, demote, promote};
use burn_inpaint_core::InpaintError;

use crate::oscillator::HarmonicOscillator;
use crate::sampler::InpaintSamplerConfig;
use crate::schedule::per_batch;
use crate::score::{InpaintModel, ScoreEstimator};
use crate::steps::{branch_coefficients, BlendedCoefficients};

/// Relaxation state carried between inner iterations.
pub struct LangevinState<B: Backend> {
    /// Momentum of the underdamped walk
    pub momentum: Tensor<B, 4>,
    /// Drift target from the previous score evaluation
    pub drift: Tensor<B, 4>,
}

/// Advance the relaxed sample by one inner iteration.
///
/// Returns the input unchanged when the mean unknown-branch increment is not
/// positive, which happens at the noise-free endpoint of the schedule.
pub fn relax_step<B: Backend, M: InpaintModel<B>>(
    x_t: Tensor<B, 4>,
    estimator: &ScoreEstimator<'_, B, M>,
    config: &InpaintSamplerConfig,
    step_size: &Tensor<B, 4>,
    mask_weights: &Tensor<B, 4>,
    state: Option<LangevinState<B>>,
) -> Result<(Tensor<B, 4>, Option<LangevinState<B>>), InpaintError> {
    let coefficients = branch_coefficients(config, step_size, estimator.times());
    if coefficients.mean_unknown_dt() <= 0.0 {
        if config.debug {
            eprintln!("[langevin] nonpositive increment, skipping update");
        }
        return Ok((x_t, state));
    }
    let blended = coefficients.blended(mask_weights);

    let abt = per_batch(&estimator.times().abt);
    let one_minus_abt = abt.clone().neg() + 1.0;
    let drift_target = |x: &Tensor<B, 4>| -> Result<Tensor<B, 4>, InpaintError> {
        let clean = estimator.denoised(x)?;
        Ok((clean * abt.clone().sqrt() - x.clone()) / one_minus_abt.clone()
            + blended.anchor_scale.clone() * x.clone())
    };

    match state {
        None => {
            let target = drift_target(&x_t)?;
            let (x_new, momentum) = advance(x_t, None, blended.dt.clone(), &blended, &target);
            Ok((
                x_new,
                Some(LangevinState {
                    momentum,
                    drift: target,
                }),
            ))
        }
        Some(previous) => {
            // symmetric splitting: half-step on the old target, re-linearize
            // at the midpoint, kick the momentum by the target change, then
            // finish on the old target
            let half = blended.dt.clone() / 2.0;
            let (x_mid, momentum) = advance(
                x_t,
                Some(previous.momentum),
                half.clone(),
                &blended,
                &previous.drift,
            );
            let target = drift_target(&x_mid)?;
            let kicked = momentum
                + blended.friction.clone().sqrt()
                    * (target.clone() - previous.drift.clone())
                    * blended.dt.clone();
            let (x_new, momentum) = advance(x_mid, Some(kicked), half, &blended, &previous.drift);
            Ok((
                x_new,
                Some(LangevinState {
                    momentum,
                    drift: target,
                }),
            ))
        }
    }
}

/// Exact oscillator move in full precision.
fn advance<B: Backend>(
    x: Tensor<B, 4>,
    v: Option<Tensor<B, 4>>,
    dt: Tensor<B, 4>,
    coefficients: &BlendedCoefficients<B>,
    drift_target: &Tensor<B, 4>,
) -> (Tensor<B, 4>, Tensor<B, 4>) {
    let ambient = precision::float_dtype(&x);
    // the oscillator anchors at C with drift -Γ A (x - C); the estimator
    // hands over the already-scaled target A C
    let anchor = drift_target.clone() / coefficients.anchor_scale.clone();
    let oscillator = HarmonicOscillator::new(
        promote(coefficients.friction.clone()),
        promote(coefficients.anchor_scale.clone()),
        promote(anchor),
        promote(coefficients.diffusion.clone()),
    );
    let (x_new, v_new) = oscillator.advance(promote(x), v.map(promote), promote(dt));
    (demote(x_new, ambient.clone()), demote(v_new, ambient))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ScheduleFamily, TimeTriple};
    use crate::score::ModelPrediction;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    struct ConstantModel {
        target: Tensor<TestBackend, 4>,
    }

    impl InpaintModel<TestBackend> for ConstantModel {
        type Options = ();

        fn predict(
            &self,
            _sample: Tensor<TestBackend, 4>,
            _noise_level: Tensor<TestBackend, 1>,
            _options: &(),
            _seed: u64,
        ) -> Result<ModelPrediction<TestBackend>, InpaintError> {
            Ok(ModelPrediction {
                denoised: self.target.clone(),
                auxiliary: self.target.clone(),
            })
        }

        fn noise_known_region(
            &self,
            _sample: Tensor<TestBackend, 4>,
            sigma: Tensor<TestBackend, 1>,
            noise_residual: Tensor<TestBackend, 4>,
            known_target: Tensor<TestBackend, 4>,
        ) -> Result<Tensor<TestBackend, 4>, InpaintError> {
            let [n] = sigma.dims();
            Ok(known_target + noise_residual * sigma.reshape([n, 1, 1, 1]))
        }
    }

    fn device() -> <TestBackend as Backend>::Device {
        <TestBackend as Backend>::Device::default()
    }

    fn fill(value: f32) -> Tensor<TestBackend, 4> {
        Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &device()) * value
    }

    fn setup() -> (
        ConstantModel,
        Tensor<TestBackend, 4>,
        Tensor<TestBackend, 4>,
        TimeTriple<TestBackend>,
        InpaintSamplerConfig,
    ) {
        let model = ConstantModel { target: fill(1.0) };
        let known = fill(-1.0);
        let mask = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device());
        let times = TimeTriple::from_sigma(Tensor::from_floats([1.0], &device()));
        (model, known, mask, times, InpaintSamplerConfig::default())
    }

    #[test]
    fn test_zero_increment_returns_input_unchanged() {
        let (model, known, mask, times, config) = setup();
        let estimator = ScoreEstimator::new(
            &model,
            &known,
            &mask,
            &times,
            ScheduleFamily::VariancePreserving,
            config.coupling,
            &(),
            0,
        );

        let x = fill(0.3);
        let step = Tensor::<TestBackend, 4>::zeros([1, 1, 1, 1], &device());
        let (out, state) = relax_step(x.clone(), &estimator, &config, &step, &mask, None).unwrap();

        let a: Vec<f32> = x.into_data().to_vec().unwrap();
        let b: Vec<f32> = out.into_data().to_vec().unwrap();
        assert_eq!(a, b);
        assert!(state.is_none());
    }

    #[test]
    fn test_first_iteration_initializes_state() {
        let (model, known, mask, times, config) = setup();
        let estimator = ScoreEstimator::new(
            &model,
            &known,
            &mask,
            &times,
            ScheduleFamily::VariancePreserving,
            config.coupling,
            &(),
            0,
        );

        let step = fill(0.05);
        let (out, state) = relax_step(fill(0.3), &estimator, &config, &step, &mask, None).unwrap();

        let state = state.expect("first iteration stores momentum and drift");
        assert_eq!(out.dims(), [1, 1, 2, 2]);
        assert_eq!(state.momentum.dims(), [1, 1, 2, 2]);
        assert_eq!(state.drift.dims(), [1, 1, 2, 2]);
    }

    #[test]
    fn test_first_iteration_is_single_full_step() {
        let (model, known, mask, times, config) = setup();
        let estimator = ScoreEstimator::new(
            &model,
            &known,
            &mask,
            &times,
            ScheduleFamily::VariancePreserving,
            config.coupling,
            &(),
            0,
        );

        let step = fill(0.05);
        let x = fill(0.3);
        <TestBackend as Backend>::seed(3);
        let (out, _) = relax_step(x.clone(), &estimator, &config, &step, &mask, None).unwrap();

        // without prior state the iteration is one unsplit propagation at the
        // drift target of the incoming sample
        let coefficients = branch_coefficients(&config, &step, &times).blended(&mask);
        let abt = per_batch(&times.abt);
        let clean = estimator.denoised(&x).unwrap();
        let target = (clean * abt.clone().sqrt() - x.clone()) / (abt.neg() + 1.0)
            + coefficients.anchor_scale.clone() * x.clone();
        let oscillator = HarmonicOscillator::new(
            coefficients.friction.clone(),
            coefficients.anchor_scale.clone(),
            target / coefficients.anchor_scale,
            coefficients.diffusion,
        );
        <TestBackend as Backend>::seed(3);
        let (expected, _) = oscillator.advance(x, None, coefficients.dt);

        assert_eq!(
            out.into_data().to_vec::<f32>().unwrap(),
            expected.into_data().to_vec::<f32>().unwrap()
        );
    }

    #[test]
    fn test_momentum_threads_across_iterations() {
        <TestBackend as Backend>::seed(11);
        let (model, known, mask, times, config) = setup();
        let estimator = ScoreEstimator::new(
            &model,
            &known,
            &mask,
            &times,
            ScheduleFamily::VariancePreserving,
            config.coupling,
            &(),
            0,
        );

        let step = fill(0.05);
        let mut x = fill(0.3);
        let mut state = None;
        for _ in 0..4 {
            let (next, next_state) =
                relax_step(x, &estimator, &config, &step, &mask, state).unwrap();
            x = next;
            state = next_state;
        }

        assert!(state.is_some());
        for value in x.into_data().to_vec::<f32>().unwrap() {
            assert!(value.is_finite());
            assert!(value.abs() < 100.0);
        }
    }
}
