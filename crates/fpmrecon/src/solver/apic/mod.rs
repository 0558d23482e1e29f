//! Closed-form spectral stitching for NA-matched illuminations.
//!
//! Each NA-matched frame yields its complex field directly through
//! [`kramers_kronig::recover_field`]; the pupil-limited spectra are placed on
//! the high-resolution grid at their mapped offsets and overlaps are averaged
//! by coverage count. No iteration is involved.

mod config;
mod kramers_kronig;

pub use config::ApicConfig;

use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

use crate::dataset::{FrameStack, IlluminationSet};
use crate::error::{ReconstructError, Result};
use crate::fft::{fftshift, to_complex, Fft2};
use crate::geometry::IlluminationOffset;
use crate::optics::OpticalSystem;
use crate::pupil::PupilModel;
use crate::result::{extract, AlgorithmKind, ReconstructionResult, RunReport, Termination};
use crate::spectrum::{try_filled, HighResSpectrum};

use super::{prepare_run, Reconstruct, RunHooks};

/// Direct (non-iterative) reconstruction solver.
#[derive(Debug, Clone, Default)]
pub struct ClosedFormSolver {
    config: ApicConfig,
}

impl ClosedFormSolver {
    pub fn new(config: ApicConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ApicConfig {
        &self.config
    }
}

/// Running sum of stitched spectra and their aperture coverage.
struct Stitcher {
    sum: HighResSpectrum,
    count: DMatrix<f64>,
    energy_scale: f64,
}

impl Stitcher {
    fn new(rows: usize, cols: usize, upsample: usize) -> Result<Self> {
        Ok(Self {
            sum: HighResSpectrum::zeros(rows, cols)?,
            count: try_filled(rows, cols, 0.0)?,
            energy_scale: (upsample * upsample) as f64,
        })
    }

    /// Add the aperture-limited spectrum of a frame-sized `field`.
    fn add(
        &mut self,
        offset: &IlluminationOffset,
        mut field: DMatrix<Complex64>,
        aperture: &DMatrix<f64>,
        fft: &mut Fft2,
    ) {
        fft.forward(&mut field);
        let spectrum = fftshift(&field);
        let (rows, cols) = spectrum.shape();
        let mut window = self.sum.window(offset, rows, cols);
        for ((w, s), a) in window.iter_mut().zip(spectrum.iter()).zip(aperture.iter()) {
            *w += *s * (a * self.energy_scale);
        }
        self.sum.write_window(offset, &window);

        let origin = offset.window_origin(rows, cols);
        let mut count = self.count.view_mut(origin, (rows, cols));
        for (c, a) in count.iter_mut().zip(aperture.iter()) {
            *c += a;
        }
    }

    /// Coverage-averaged spectrum; uncovered samples stay zero.
    fn finish(self) -> HighResSpectrum {
        let mut data = self.sum.into_matrix();
        for (s, c) in data.iter_mut().zip(self.count.iter()) {
            if *c > 0.0 {
                *s /= *c;
            }
        }
        HighResSpectrum::from_matrix(data)
    }
}

impl Reconstruct for ClosedFormSolver {
    fn reconstruct(
        &self,
        frames: &FrameStack,
        illumination: &IlluminationSet,
        system: &OpticalSystem,
        hooks: &mut RunHooks<'_>,
    ) -> Result<ReconstructionResult> {
        self.config.validate()?;
        let run = prepare_run(
            frames,
            illumination,
            system,
            &self.config.selection,
            self.config.upsample,
        )?;
        if hooks.is_cancelled() {
            return Err(ReconstructError::Cancelled { iterations: 0 });
        }
        hooks.progress(10);

        let (grid_rows, grid_cols) = run.mapper.grid_dims();
        let (rows, cols) = run.frame_dims;
        let mut stitcher = Stitcher::new(grid_rows, grid_cols, self.config.upsample)?;
        let pupil = PupilModel::new(system, run.frame_dims)?;
        let mut planner = FftPlanner::new();
        let mut frame_fft = Fft2::new(&mut planner, rows, cols);

        let (dc_row, dc_col) = run.mapper.dc_index();
        let dpix = system.sample_pixel_um();
        let min_radius = (1.0 - self.config.match_tolerance) * system.kmax();
        let mut used = Vec::new();
        for (offset, intensity) in run.offsets.iter().zip(&run.intensities) {
            // zero frequency relative to the window center
            let dx = dc_col as i64 - offset.u as i64;
            let dy = dc_row as i64 - offset.v as i64;
            let local_row = (rows / 2) as i64 + dy;
            let local_col = (cols / 2) as i64 + dx;
            let inside = (0..rows as i64).contains(&local_row)
                && (0..cols as i64).contains(&local_col)
                && pupil.contains(local_row as usize, local_col as usize);
            let kx = dx as f64 / (cols as f64 * dpix) * 2.0 * PI;
            let ky = dy as f64 / (rows as f64 * dpix) * 2.0 * PI;
            if !(inside && kx.hypot(ky) >= min_radius) {
                tracing::trace!(frame = offset.frame, dx, dy, "illumination not NA-matched, skipped");
                continue;
            }
            let field = kramers_kronig::recover_field(intensity, (dx, dy), &mut frame_fft);
            stitcher.add(offset, field, pupil.aperture(), &mut frame_fft);
            used.push(offset.frame);
        }

        if used.is_empty() {
            tracing::warn!(
                "no NA-matched illumination, falling back to the reference amplitude"
            );
            hooks.log("No NA-matched illumination; using reference amplitude");
            let amplitude = run.reference().map(|i| i.sqrt());
            stitcher.add(&run.offsets[0], to_complex(&amplitude), pupil.aperture(), &mut frame_fft);
            used.push(run.offsets[0].frame);
        } else {
            let skipped = run.offsets.len() - used.len();
            if skipped > 0 {
                tracing::warn!(used = used.len(), skipped, "frames without NA match were skipped");
            }
            hooks.log(&format!("Stitched {} NA-matched frames", used.len()));
        }

        let spectrum = stitcher.finish();
        let mut grid_fft = Fft2::new(&mut planner, grid_rows, grid_cols);
        tracing::info!(
            frames = used.len(),
            grid_rows,
            grid_cols,
            "closed-form reconstruction finished"
        );
        let report = RunReport {
            algorithm: AlgorithmKind::ClosedFormApic,
            termination: Termination::ClosedForm,
            iterations: 0,
            final_alpha: 0.0,
            final_beta: 0.0,
            residual_history: Vec::new(),
            frames_used: used,
        };
        let result = extract(spectrum, pupil.into_pupil(), &mut grid_fft, report);
        hooks.progress(100);
        Ok(result)
    }
}
