//! Reconstruction solvers and the plumbing they share.
//!
//! Both solvers consume the same prepared inputs: a sweep plan over the
//! selected illuminations, intensities normalized by the selected maximum,
//! and the per-frame spectrum offsets. Everything here is validated before
//! the high-resolution grid is allocated.

pub mod apic;
pub mod epry;

use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::dataset::{plan_sweep, validate_inputs, FrameStack, IlluminationSelection, IlluminationSet};
use crate::error::{ReconstructError, Result};
use crate::geometry::{GeometryMapper, IlluminationOffset};
use crate::optics::OpticalSystem;
use crate::result::{AlgorithmKind, ReconstructionResult};

pub use apic::{ApicConfig, ClosedFormSolver};
pub use epry::{EngineState, EpryConfig, IterativeEngine};

/// A reconstruction strategy over one in-memory capture set.
pub trait Reconstruct {
    fn reconstruct(
        &self,
        frames: &FrameStack,
        illumination: &IlluminationSet,
        system: &OpticalSystem,
        hooks: &mut RunHooks<'_>,
    ) -> Result<ReconstructionResult>;
}

/// Solver selection with its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Algorithm {
    IterativeEpry(EpryConfig),
    ClosedFormApic(ApicConfig),
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::IterativeEpry(EpryConfig::default())
    }
}

impl Algorithm {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::IterativeEpry(_) => AlgorithmKind::IterativeEpry,
            Self::ClosedFormApic(_) => AlgorithmKind::ClosedFormApic,
        }
    }
}

impl Reconstruct for Algorithm {
    fn reconstruct(
        &self,
        frames: &FrameStack,
        illumination: &IlluminationSet,
        system: &OpticalSystem,
        hooks: &mut RunHooks<'_>,
    ) -> Result<ReconstructionResult> {
        match self {
            Self::IterativeEpry(config) => {
                IterativeEngine::new(config.clone()).reconstruct(frames, illumination, system, hooks)
            }
            Self::ClosedFormApic(config) => {
                ClosedFormSolver::new(config.clone()).reconstruct(frames, illumination, system, hooks)
            }
        }
    }
}

/// Optional caller callbacks for one run.
///
/// Progress values are integers in `0..=100`. The cancellation flag is
/// polled once per global iteration; the run stops with
/// [`ReconstructError::Cancelled`] when it is set.
#[derive(Default)]
pub struct RunHooks<'a> {
    progress: Option<Box<dyn FnMut(u8) + 'a>>,
    log: Option<Box<dyn FnMut(&str) + 'a>>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> RunHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, f: impl FnMut(u8) + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn with_log(mut self, f: impl FnMut(&str) + 'a) -> Self {
        self.log = Some(Box::new(f));
        self
    }

    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub(crate) fn progress(&mut self, percent: u8) {
        if let Some(f) = self.progress.as_mut() {
            f(percent.min(100));
        }
    }

    pub(crate) fn log(&mut self, message: &str) {
        if let Some(f) = self.log.as_mut() {
            f(message);
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }
}

/// Inputs resolved for a run: frames in processing order with their
/// offsets, intensities already normalized.
pub(crate) struct PreparedRun {
    pub mapper: GeometryMapper,
    pub frame_dims: (usize, usize),
    pub order: Vec<usize>,
    pub offsets: Vec<IlluminationOffset>,
    pub intensities: Vec<DMatrix<f64>>,
}

impl PreparedRun {
    /// Normalized intensity of the first planned frame.
    pub fn reference(&self) -> &DMatrix<f64> {
        &self.intensities[0]
    }
}

pub(crate) fn prepare_run(
    frames: &FrameStack,
    illumination: &IlluminationSet,
    system: &OpticalSystem,
    selection: &IlluminationSelection,
    upsample: usize,
) -> Result<PreparedRun> {
    validate_inputs(frames, illumination, system)?;
    if !(selection.tolerance.is_finite() && selection.tolerance >= 0.0) {
        return Err(ReconstructError::config(format!(
            "illumination tolerance must be finite and non-negative, got {}",
            selection.tolerance
        )));
    }
    let order = plan_sweep(illumination, system, selection)?;
    let frame_dims = frames.dims();
    let mapper = GeometryMapper::new(system, frame_dims, upsample)?;
    let offsets = mapper.offsets(illumination, &order)?;

    let max = frames.max_over(&order);
    if max <= 0.0 {
        return Err(ReconstructError::config(
            "selected frames have zero maximum intensity",
        ));
    }
    let intensities = order.iter().map(|&i| frames.frame(i) / max).collect();

    tracing::debug!(
        frames = order.len(),
        grid_rows = mapper.grid_dims().0,
        grid_cols = mapper.grid_dims().1,
        max_intensity = max,
        "prepared reconstruction inputs"
    );
    Ok(PreparedRun {
        mapper,
        frame_dims,
        order,
        offsets,
        intensities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn hooks_are_optional() {
        let mut hooks = RunHooks::new();
        hooks.progress(50);
        hooks.log("noop");
        assert!(!hooks.is_cancelled());
    }

    #[test]
    fn hooks_forward_calls() {
        let seen = RefCell::new(Vec::new());
        let logs = RefCell::new(Vec::new());
        let flag = AtomicBool::new(true);
        let mut hooks = RunHooks::new()
            .with_progress(|p| seen.borrow_mut().push(p))
            .with_log(|m| logs.borrow_mut().push(m.to_string()))
            .with_cancel_flag(&flag);
        hooks.progress(30);
        hooks.progress(130);
        hooks.log("hello");
        assert!(hooks.is_cancelled());
        drop(hooks);
        assert_eq!(seen.into_inner(), vec![30, 100]);
        assert_eq!(logs.into_inner(), vec!["hello".to_string()]);
    }

    #[test]
    fn algorithm_config_is_tagged() {
        let json = serde_json::to_string(&Algorithm::default()).unwrap();
        assert!(json.contains("\"kind\":\"iterative_epry\""), "{json}");
        let parsed: Algorithm =
            serde_json::from_str(r#"{"kind":"closed_form_apic","upsample":2}"#).unwrap();
        match parsed {
            Algorithm::ClosedFormApic(cfg) => {
                assert_eq!(cfg.upsample, 2);
                assert_eq!(cfg.match_tolerance, ApicConfig::default().match_tolerance);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_stack_is_rejected() {
        let frames = FrameStack::new(vec![DMatrix::zeros(4, 4)]).unwrap();
        let illumination = IlluminationSet::new(vec![[0.0, 0.0]]).unwrap();
        let res = prepare_run(
            &frames,
            &illumination,
            &OpticalSystem::default(),
            &IlluminationSelection::default(),
            2,
        );
        assert!(matches!(res, Err(ReconstructError::Configuration(_))));
    }

    #[test]
    fn intensities_follow_plan_and_are_normalized() {
        let frames = FrameStack::new(vec![
            DMatrix::from_element(4, 4, 4.0),
            DMatrix::from_element(4, 4, 2.0),
        ])
        .unwrap();
        let illumination = IlluminationSet::new(vec![[0.01, 0.0], [0.0, 0.0]]).unwrap();
        let run = prepare_run(
            &frames,
            &illumination,
            &OpticalSystem::default(),
            &IlluminationSelection::default(),
            2,
        )
        .unwrap();
        assert_eq!(run.order, vec![1, 0]);
        assert_eq!(run.reference()[(0, 0)], 0.5);
        assert_eq!(run.intensities[1][(3, 3)], 1.0);
        assert_eq!(run.offsets[0].frame, 1);
    }
}
