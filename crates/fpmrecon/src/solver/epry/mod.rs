//! Iterative alternating-projection engine with pupil co-estimation.
//!
//! One global iteration sweeps the planned illuminations in ascending-NA
//! order. For each frame the current spectrum window is imaged through the
//! pupil, its magnitude is replaced by the measurement, and the difference
//! is written back with pupil-weighted, step-scaled increments. After every
//! sweep a [`ConvergenceController`] halves the step sizes on stalls and
//! stops the run once `alpha` decays below its floor.
//!
//! The spectrum is shared by all overlapping windows and updated in place;
//! frames are never processed concurrently.

mod config;
mod convergence;
mod step;

pub use config::EpryConfig;
pub use convergence::ConvergenceState;

use nalgebra::DMatrix;
use rustfft::FftPlanner;

use crate::dataset::{FrameStack, IlluminationSet};
use crate::error::{ReconstructError, Result};
use crate::fft::Fft2;
use crate::optics::OpticalSystem;
use crate::pupil::PupilModel;
use crate::result::{extract, AlgorithmKind, ReconstructionResult, RunReport, Termination};
use crate::spectrum::{initial_spectrum, try_filled, HighResSpectrum};

use super::{prepare_run, PreparedRun, Reconstruct, RunHooks};
use convergence::{ConvergenceController, ConvergenceDecision};
use step::{update_illumination, IntensityConstraint, StepParams};

/// Lifecycle of one engine run.
///
/// `Idle -> Running -> Finished -> Done`; `Running { iteration }` names the
/// last completed sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running { iteration: usize },
    Finished(Termination),
    Done,
}

impl EngineState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Done)
    }
}

/// Iterative reconstruction solver.
#[derive(Debug, Clone, Default)]
pub struct IterativeEngine {
    config: EpryConfig,
}

impl IterativeEngine {
    pub fn new(config: EpryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EpryConfig {
        &self.config
    }

    /// Validate inputs, allocate the grid and seed the spectrum without
    /// running any sweep.
    pub fn start(
        &self,
        frames: &FrameStack,
        illumination: &IlluminationSet,
        system: &OpticalSystem,
    ) -> Result<EngineRun> {
        self.config.validate()?;
        let run = prepare_run(
            frames,
            illumination,
            system,
            &self.config.selection,
            self.config.upsample,
        )?;
        let (grid_rows, grid_cols) = run.mapper.grid_dims();
        let (rows, cols) = run.frame_dims;

        let mut planner = FftPlanner::new();
        let mut grid_fft = Fft2::new(&mut planner, grid_rows, grid_cols);
        let frame_fft = Fft2::new(&mut planner, rows, cols);
        let spectrum = initial_spectrum(run.reference(), self.config.upsample, &mut grid_fft)?;
        let coverage = try_filled(grid_rows, grid_cols, 0.0)?;
        let pupil = PupilModel::new(system, run.frame_dims)?;

        tracing::info!(
            frames = run.order.len(),
            rows,
            cols,
            grid_rows,
            grid_cols,
            upsample = self.config.upsample,
            pupil_correction = self.config.pupil_correction,
            "starting iterative reconstruction"
        );
        Ok(EngineRun {
            controller: ConvergenceController::new(self.config.alpha, self.config.beta),
            config: self.config.clone(),
            run,
            spectrum,
            pupil,
            coverage,
            grid_fft,
            frame_fft,
            residual_history: Vec::new(),
            state: EngineState::Idle,
        })
    }
}

impl Reconstruct for IterativeEngine {
    fn reconstruct(
        &self,
        frames: &FrameStack,
        illumination: &IlluminationSet,
        system: &OpticalSystem,
        hooks: &mut RunHooks<'_>,
    ) -> Result<ReconstructionResult> {
        let mut run = self.start(frames, illumination, system)?;
        let max_iters = self.config.max_iters;
        loop {
            let state = run.step();
            let done = run.iterations();
            hooks.progress((done * 100 / max_iters) as u8);
            hooks.log(&format!("Iteration {done}/{max_iters}"));
            if state.is_finished() {
                break;
            }
            if hooks.is_cancelled() {
                tracing::info!(iterations = done, "reconstruction cancelled");
                return Err(ReconstructError::Cancelled { iterations: done });
            }
        }
        hooks.progress(100);
        run.finish()
    }
}

/// An engine run that can be advanced one global iteration at a time.
///
/// Between calls to [`EngineRun::step`] the spectrum and pupil are in an
/// iteration-boundary state and may be inspected.
pub struct EngineRun {
    config: EpryConfig,
    run: PreparedRun,
    spectrum: HighResSpectrum,
    pupil: PupilModel,
    /// Union of pupil supports over the sweep, built during the first one.
    coverage: DMatrix<f64>,
    grid_fft: Fft2,
    frame_fft: Fft2,
    controller: ConvergenceController,
    residual_history: Vec<f64>,
    state: EngineState,
}

impl EngineRun {
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Completed global iterations.
    pub fn iterations(&self) -> usize {
        self.residual_history.len()
    }

    pub fn residual_history(&self) -> &[f64] {
        &self.residual_history
    }

    pub fn convergence(&self) -> ConvergenceState {
        self.controller.state()
    }

    pub fn spectrum(&self) -> &HighResSpectrum {
        &self.spectrum
    }

    pub fn pupil(&self) -> &PupilModel {
        &self.pupil
    }

    /// Frame indices in processing order.
    pub fn plan(&self) -> &[usize] {
        &self.run.order
    }

    /// Run one global iteration and return the new state. A finished run is
    /// left untouched.
    pub fn step(&mut self) -> EngineState {
        let iteration = match self.state {
            EngineState::Idle => 0,
            EngineState::Running { iteration } => iteration + 1,
            EngineState::Finished(_) | EngineState::Done => return self.state,
        };

        let error = self.sweep(iteration);
        self.residual_history.push(error);
        let decision = self.controller.observe(iteration, error);
        tracing::debug!(
            iteration = iteration + 1,
            error,
            alpha = self.controller.alpha(),
            beta = self.controller.beta(),
            "sweep complete"
        );

        let next = match decision {
            ConvergenceDecision::Diverged => {
                tracing::warn!(iteration = iteration + 1, "non-finite residual, stopping");
                EngineState::Finished(Termination::Diverged)
            }
            ConvergenceDecision::Converged => EngineState::Finished(Termination::Converged),
            ConvergenceDecision::Stalled | ConvergenceDecision::Continue => {
                if iteration + 1 >= self.config.max_iters {
                    EngineState::Finished(Termination::MaxIterReached)
                } else {
                    EngineState::Running { iteration }
                }
            }
        };
        self.transition(next);
        self.state
    }

    /// Extract the result of a finished run.
    pub fn finish(mut self) -> Result<ReconstructionResult> {
        let EngineState::Finished(termination) = self.state else {
            return Err(ReconstructError::config(format!(
                "engine run cannot finish from state {:?}",
                self.state
            )));
        };
        self.transition(EngineState::Done);
        tracing::info!(
            ?termination,
            iterations = self.iterations(),
            final_alpha = self.controller.alpha(),
            "iterative reconstruction finished"
        );
        let report = RunReport {
            algorithm: AlgorithmKind::IterativeEpry,
            termination,
            iterations: self.residual_history.len(),
            final_alpha: self.controller.alpha(),
            final_beta: self.controller.beta(),
            residual_history: self.residual_history,
            frames_used: self.run.order,
        };
        Ok(extract(
            self.spectrum,
            self.pupil.into_pupil(),
            &mut self.grid_fft,
            report,
        ))
    }

    fn transition(&mut self, next: EngineState) {
        tracing::trace!(from = ?self.state, to = ?next, "engine state");
        self.state = next;
    }

    fn sweep(&mut self, iteration: usize) -> f64 {
        if iteration > 0 {
            self.spectrum.mask_in_place(&self.coverage);
        }
        let (rows, cols) = self.run.frame_dims;
        let params = StepParams {
            alpha: self.controller.alpha(),
            beta: self.controller.beta(),
            pupil_correction: self.config.pupil_correction,
            energy_scale: 1.0 / (self.config.upsample * self.config.upsample) as f64,
        };
        let mut error = 0.0;
        let mut passed_through = 0usize;
        for (offset, measured) in self.run.offsets.iter().zip(&self.run.intensities) {
            let outcome = update_illumination(
                &mut self.spectrum,
                &mut self.pupil,
                offset,
                measured,
                &params,
                &mut self.frame_fft,
            );
            if outcome.constraint == IntensityConstraint::PassedThrough {
                passed_through += 1;
            }
            if iteration == 0 {
                let origin = offset.window_origin(rows, cols);
                let mut cover = self.coverage.view_mut(origin, (rows, cols));
                for (c, a) in cover.iter_mut().zip(self.pupil.aperture().iter()) {
                    *c = a + *c * (1.0 - a);
                }
            }
            error += outcome.residual;
        }
        if passed_through > 0 {
            tracing::debug!(
                iteration = iteration + 1,
                passed_through,
                "frames below activity threshold were not constrained"
            );
        }
        error
    }
}
