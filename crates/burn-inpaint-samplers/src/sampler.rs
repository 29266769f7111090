//! Outer-loop entry point for constrained inpainting
//!
//! Called once per denoising step of the host sampler. Replaces the known
//! region with the target advanced to the current noise level, relaxes the
//! whole sample with a few constrained Langevin iterations, and returns a
//! denoised estimate whose known region matches the target exactly.

use burn::prelude::*;

use burn_inpaint_core::{mask, InpaintError};

use crate::langevin::relax_step;
use crate::schedule::{per_batch, ScheduleFamily, TimeTriple};
use crate::score::{InpaintModel, ScoreEstimator};

/// Tuning parameters for the relaxation.
#[derive(Debug, Clone)]
pub struct InpaintSamplerConfig {
    /// Inner Langevin iterations per outer step
    pub inner_steps: usize,
    /// Friction scale of the underdamped walk
    pub friction: f32,
    /// Known-branch coupling strength (the guidance trade-off `lambda`)
    pub coupling: f32,
    /// Known-branch increment weight relative to the unknown branch
    pub branch_damping: f32,
    /// Base inner time increment, rescaled by `1 - abt` at each noise level
    pub step_size: f32,
    /// Noise-schedule convention of the host sampler
    pub family: ScheduleFamily,
    /// Scale injected noise with the ambient noise level instead of keeping
    /// it constant
    pub noise_scaled_diffusion: bool,
    /// Print per-step diagnostics to stderr
    pub debug: bool,
}

impl Default for InpaintSamplerConfig {
    fn default() -> Self {
        Self {
            inner_steps: 5,
            friction: 15.0,
            coupling: 4.0,
            branch_damping: 1.0,
            step_size: 0.1,
            family: ScheduleFamily::default(),
            noise_scaled_diffusion: false,
            debug: false,
        }
    }
}

/// Constrained Langevin inpainting sampler.
pub struct LangevinInpaintSampler {
    config: InpaintSamplerConfig,
}

impl LangevinInpaintSampler {
    pub fn new(config: InpaintSamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InpaintSamplerConfig {
        &self.config
    }

    /// Run one outer inpainting step at the noise level described by `times`.
    ///
    /// `mask_weights` uses 1 for the known region and 0 for the unknown
    /// region, with fractional values blending the two dynamics.
    /// `noise_residual` is the outer loop's noise draw for this step, reused
    /// so the replaced known region stays on the outer trajectory.
    /// `inner_steps` overrides the configured iteration count when set.
    #[allow(clippy::too_many_arguments)]
    pub fn sample<B: Backend, M: InpaintModel<B>>(
        &self,
        model: &M,
        sample: Tensor<B, 4>,
        known_target: Tensor<B, 4>,
        noise_residual: Tensor<B, 4>,
        times: &TimeTriple<B>,
        mask_weights: Tensor<B, 4>,
        options: &M::Options,
        seed: u64,
        inner_steps: Option<usize>,
    ) -> Result<Tensor<B, 4>, InpaintError> {
        validate_shapes(&sample, &known_target, &noise_residual, &mask_weights)?;
        times.validate(sample.dims()[0])?;
        B::seed(seed);

        let steps = inner_steps.unwrap_or(self.config.inner_steps);
        if self.config.debug {
            eprintln!(
                "[langevin] family={:?} steps={steps} sigma={:?}",
                self.config.family,
                times.sigma.to_data()
            );
        }

        // inner increments shrink to zero at the noise-free endpoint
        let one_minus_abt = mask::complement(&per_batch(&times.abt));
        let step_size = one_minus_abt * self.config.step_size;

        // hard replace: the known region restarts each outer step from the
        // target advanced to the current noise level
        let noised = model.noise_known_region(
            sample.clone(),
            times.sigma.clone(),
            noise_residual,
            known_target.clone(),
        )?;
        let replaced = mask::blend(noised, sample, &mask_weights);

        let mut x_t = self.config.family.to_relaxed(replaced, times);
        let mut state = None;
        for _ in 0..steps {
            let estimator = ScoreEstimator::new(
                model,
                &known_target,
                &mask_weights,
                times,
                self.config.family,
                self.config.coupling,
                options,
                seed,
            );
            let (next, next_state) = relax_step(
                x_t,
                &estimator,
                &self.config,
                &step_size,
                &mask_weights,
                state,
            )?;
            x_t = next;
            state = next_state;
        }

        let relaxed = self.config.family.from_relaxed(x_t, times);
        let prediction = model.predict(
            relaxed,
            self.config.family.native_level(times),
            options,
            seed,
        )?;
        Ok(mask::blend(known_target, prediction.denoised, &mask_weights))
    }
}

fn validate_shapes<B: Backend>(
    sample: &Tensor<B, 4>,
    known_target: &Tensor<B, 4>,
    noise_residual: &Tensor<B, 4>,
    mask_weights: &Tensor<B, 4>,
) -> Result<(), InpaintError> {
    for tensor in [known_target, noise_residual] {
        if tensor.dims() != sample.dims() {
            return Err(InpaintError::ShapeMismatch {
                expected: sample.dims().to_vec(),
                actual: tensor.dims().to_vec(),
            });
        }
    }
    mask::validate_broadcast(&sample.dims(), &mask_weights.dims())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ModelPrediction;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    /// Denoiser that shrinks the sample toward a fixed target.
    struct AffineModel {
        target: Tensor<TestBackend, 4>,
    }

    impl InpaintModel<TestBackend> for AffineModel {
        type Options = ();

        fn predict(
            &self,
            sample: Tensor<TestBackend, 4>,
            _noise_level: Tensor<TestBackend, 1>,
            _options: &(),
            _seed: u64,
        ) -> Result<ModelPrediction<TestBackend>, InpaintError> {
            let denoised = self.target.clone() * 0.8 + sample * 0.2;
            Ok(ModelPrediction {
                auxiliary: denoised.clone(),
                denoised,
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

    fn values(t: Tensor<TestBackend, 4>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    fn run(
        sampler: &LangevinInpaintSampler,
        mask_weights: Tensor<TestBackend, 4>,
        sigma: f32,
        inner_steps: Option<usize>,
    ) -> Result<Tensor<TestBackend, 4>, InpaintError> {
        let model = AffineModel { target: fill(0.5) };
        let times = TimeTriple::from_sigma(Tensor::from_floats([sigma], &device()));
        sampler.sample(
            &model,
            fill(0.2),
            fill(-1.0),
            fill(0.7),
            &times,
            mask_weights,
            &(),
            42,
            inner_steps,
        )
    }

    #[test]
    fn test_fully_known_mask_returns_target() {
        let sampler = LangevinInpaintSampler::new(InpaintSamplerConfig::default());
        let out = run(&sampler, fill(1.0), 1.0, None).unwrap();
        for value in values(out) {
            assert!((value - (-1.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_identical_calls_are_deterministic() {
        let sampler = LangevinInpaintSampler::new(InpaintSamplerConfig::default());
        let mask = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device());
        let a = run(&sampler, mask.clone(), 1.0, None).unwrap();
        let b = run(&sampler, mask, 1.0, None).unwrap();
        assert_eq!(values(a), values(b));
    }

    #[test]
    fn test_fully_unknown_mask_ignores_known_branch_tuning() {
        // with no known region the coupling and branch-damping knobs must not
        // reach the output
        let baseline = LangevinInpaintSampler::new(InpaintSamplerConfig::default());
        let retuned = LangevinInpaintSampler::new(InpaintSamplerConfig {
            coupling: 9.0,
            branch_damping: 0.25,
            ..Default::default()
        });
        let mask = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device());

        let a = run(&baseline, mask.clone(), 1.0, None).unwrap();
        let b = run(&retuned, mask, 1.0, None).unwrap();
        assert_eq!(values(a), values(b));
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        let sampler = LangevinInpaintSampler::new(InpaintSamplerConfig::default());
        let model = AffineModel { target: fill(0.5) };
        let times = TimeTriple::from_sigma(Tensor::from_floats([1.0], &device()));
        let wrong = Tensor::<TestBackend, 4>::ones([1, 1, 3, 3], &device());

        let result = sampler.sample(
            &model,
            fill(0.2),
            wrong,
            fill(0.7),
            &times,
            fill(0.0),
            &(),
            42,
            None,
        );
        assert!(matches!(result, Err(InpaintError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_rejects_batch_mismatch() {
        let sampler = LangevinInpaintSampler::new(InpaintSamplerConfig::default());
        let model = AffineModel { target: fill(0.5) };
        let times =
            TimeTriple::from_sigma(Tensor::from_floats([1.0, 2.0], &device()));

        let result = sampler.sample(
            &model,
            fill(0.2),
            fill(-1.0),
            fill(0.7),
            &times,
            fill(0.0),
            &(),
            42,
            None,
        );
        assert!(matches!(result, Err(InpaintError::BatchMismatch { .. })));
    }

    #[test]
    fn test_noise_free_endpoint_skips_relaxation() {
        // sigma = 0 collapses the inner increments, so any iteration count
        // must produce the same output as none at all
        let sampler = LangevinInpaintSampler::new(InpaintSamplerConfig::default());
        let mask = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device());
        let with_steps = run(&sampler, mask.clone(), 0.0, Some(5)).unwrap();
        let without = run(&sampler, mask, 0.0, Some(0)).unwrap();
        assert_eq!(values(with_steps), values(without));
    }

    #[test]
    fn test_inner_step_override_matches_config() {
        let configured = LangevinInpaintSampler::new(InpaintSamplerConfig {
            inner_steps: 3,
            ..Default::default()
        });
        let default = LangevinInpaintSampler::new(InpaintSamplerConfig::default());
        let mask = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device());

        let a = run(&configured, mask.clone(), 1.0, None).unwrap();
        let b = run(&default, mask, 1.0, Some(3)).unwrap();
        assert_eq!(values(a), values(b));
    }

    #[test]
    fn test_default_config() {
        let config = InpaintSamplerConfig::default();
        assert_eq!(config.inner_steps, 5);
        assert_eq!(config.friction, 15.0);
        assert_eq!(config.coupling, 4.0);
        assert_eq!(config.branch_damping, 1.0);
        assert_eq!(config.step_size, 0.1);
        assert_eq!(config.family, ScheduleFamily::VariancePreserving);
        assert!(!config.noise_scaled_diffusion);
        assert!(!config.debug);
    }
}
