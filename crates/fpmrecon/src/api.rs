//! High-level reconstruction API.
//!
//! [`Reconstructor`] is the primary entry point. It wraps an [`Algorithm`]
//! and runs it on a [`Dataset`].

use crate::dataset::Dataset;
use crate::error::Result;
use crate::result::ReconstructionResult;
use crate::solver::{Algorithm, ApicConfig, EpryConfig, Reconstruct, RunHooks};

/// Primary reconstruction interface.
///
/// Configure once, reconstruct many datasets.
///
/// # Examples
///
/// ```no_run
/// use fpmrecon::{simulate, Dataset, EpryConfig, OpticalSystem, Reconstructor};
///
/// let system = OpticalSystem::default();
/// let illumination = simulate::grid_illumination(5, 0.05).unwrap();
/// let frames =
///     simulate::capture_stack(&simulate::phantom(192, 192), &system, &illumination, 3).unwrap();
/// let dataset = Dataset::new(frames, illumination, system).unwrap();
///
/// let reconstructor = Reconstructor::iterative(EpryConfig::default());
/// let result = reconstructor.reconstruct(&dataset).unwrap();
/// println!("{:?} after {} iterations", result.report.termination, result.report.iterations);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    algorithm: Algorithm,
}

impl Reconstructor {
    pub fn new(algorithm: Algorithm) -> Self {
        Self { algorithm }
    }

    /// Iterative engine with the given configuration.
    pub fn iterative(config: EpryConfig) -> Self {
        Self::new(Algorithm::IterativeEpry(config))
    }

    /// Closed-form solver with the given configuration.
    pub fn closed_form(config: ApicConfig) -> Self {
        Self::new(Algorithm::ClosedFormApic(config))
    }

    /// Access the current algorithm selection.
    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    /// Mutable access for post-construction tuning.
    pub fn algorithm_mut(&mut self) -> &mut Algorithm {
        &mut self.algorithm
    }

    /// Reconstruct without progress, log or cancellation hooks.
    pub fn reconstruct(&self, dataset: &Dataset) -> Result<ReconstructionResult> {
        self.reconstruct_with_hooks(dataset, &mut RunHooks::new())
    }

    /// Reconstruct, reporting through `hooks` at iteration boundaries.
    pub fn reconstruct_with_hooks(
        &self,
        dataset: &Dataset,
        hooks: &mut RunHooks<'_>,
    ) -> Result<ReconstructionResult> {
        self.algorithm.reconstruct(
            &dataset.frames,
            &dataset.illumination,
            &dataset.system,
            hooks,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{AlgorithmKind, Termination};
    use crate::simulate::{capture_stack, grid_illumination, phantom};
    use crate::test_utils::system;

    fn dataset() -> Dataset {
        let sys = system(0.1);
        let illumination = grid_illumination(3, 0.05).unwrap();
        let frames = capture_stack(&phantom(64, 64), &sys, &illumination, 2).unwrap();
        Dataset::new(frames, illumination, sys).unwrap()
    }

    #[test]
    fn default_is_iterative() {
        let r = Reconstructor::default();
        assert_eq!(r.algorithm().kind(), AlgorithmKind::IterativeEpry);
    }

    #[test]
    fn tuned_iterative_run() {
        let mut r = Reconstructor::default();
        if let Algorithm::IterativeEpry(cfg) = r.algorithm_mut() {
            cfg.upsample = 2;
            cfg.max_iters = 2;
        }
        let res = r.reconstruct(&dataset()).unwrap();
        assert_eq!(res.dims(), (64, 64));
        assert_eq!(res.report.algorithm, AlgorithmKind::IterativeEpry);
        assert!(res.report.iterations <= 2);
    }

    #[test]
    fn closed_form_run() {
        let r = Reconstructor::closed_form(ApicConfig {
            upsample: 2,
            ..ApicConfig::default()
        });
        let progress = std::cell::RefCell::new(Vec::new());
        let mut hooks = RunHooks::new().with_progress(|p| progress.borrow_mut().push(p));
        let res = r.reconstruct_with_hooks(&dataset(), &mut hooks).unwrap();
        drop(hooks);
        assert_eq!(res.report.termination, Termination::ClosedForm);
        assert_eq!(progress.into_inner(), vec![10, 100]);
    }
}
