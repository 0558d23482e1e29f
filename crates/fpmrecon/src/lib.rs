//! fpmrecon — Fourier ptychographic microscopy reconstruction in pure Rust.
//!
//! A stack of low-resolution intensity frames, each captured under a
//! different oblique plane-wave illumination, is combined into one
//! high-resolution complex field. The stages are:
//!
//! 1. **Geometry** – illumination directions are snapped to integer centers
//!    of sub-spectrum windows on an upsampled frequency grid.
//! 2. **Initialization** – the reference capture is upsampled and
//!    transformed into a first spectrum estimate.
//! 3. **Solve** – either the iterative engine (alternating projections with
//!    adaptive step sizes and optional pupil co-estimation) or the
//!    closed-form solver (Kramers–Kronig field recovery of NA-matched frames
//!    and direct spectral stitching).
//! 4. **Extraction** – the spectrum is brought back to real space and split
//!    into amplitude and phase.
//!
//! # Public API
//! - [`Reconstructor`] and [`Dataset`] as primary entry points
//! - [`EpryConfig`], [`ApicConfig`] and [`Algorithm`] for tuning
//! - [`IterativeEngine::start`] for stepping a run one iteration at a time
//! - [`simulate`] for synthetic capture stacks

mod api;
mod dataset;
mod error;
mod fft;
mod geometry;
mod optics;
mod pupil;
mod result;
pub mod simulate;
mod solver;
mod spectrum;

#[cfg(test)]
pub(crate) mod test_utils;

pub use api::Reconstructor;
pub use dataset::{
    plan_sweep, Dataset, FrameStack, IlluminationMode, IlluminationSelection, IlluminationSet, Roi,
};
pub use error::{ReconstructError, Result};
pub use geometry::{GeometryMapper, IlluminationOffset};
pub use optics::OpticalSystem;
pub use pupil::PupilModel;
pub use result::{AlgorithmKind, Gray16Image, ReconstructionResult, RunReport, Termination};
pub use solver::epry::{ConvergenceState, EngineRun};
pub use solver::{
    Algorithm, ApicConfig, ClosedFormSolver, EngineState, EpryConfig, IterativeEngine,
    Reconstruct, RunHooks,
};
pub use spectrum::HighResSpectrum;
