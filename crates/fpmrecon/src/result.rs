use image::{ImageBuffer, Luma};
use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::fft::{ifftshift, Fft2};
use crate::spectrum::HighResSpectrum;

/// 16-bit grayscale raster used for exported result images.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Which solver produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    IterativeEpry,
    ClosedFormApic,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The step size decayed below its floor after repeated stalls.
    Converged,
    /// The iteration limit was reached.
    MaxIterReached,
    /// The residual became non-finite; the last state is returned as is.
    Diverged,
    /// Single-pass solver; no iteration involved.
    ClosedForm,
}

/// Run metadata reported alongside the reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub algorithm: AlgorithmKind,
    pub termination: Termination,
    /// Completed sweeps over the illumination set (0 for closed form).
    pub iterations: usize,
    /// Spectrum step size at exit.
    pub final_alpha: f64,
    /// Pupil step size at exit.
    pub final_beta: f64,
    /// Amplitude residual after each sweep.
    pub residual_history: Vec<f64>,
    /// Frame indices that contributed, in processing order.
    pub frames_used: Vec<usize>,
}

/// Reconstructed complex field in real space plus the recovered pupil.
///
/// `amplitude` and `phase` share the high-resolution grid dimensions; `pupil`
/// has frame dimensions in baseband-centered layout.
#[derive(Debug, Clone)]
pub struct ReconstructionResult {
    /// Non-negative field magnitude.
    pub amplitude: DMatrix<f64>,
    /// Field argument in `[-π, π]`.
    pub phase: DMatrix<f64>,
    pub pupil: DMatrix<Complex64>,
    pub report: RunReport,
}

impl ReconstructionResult {
    /// High-resolution grid size `(rows, cols)`.
    pub fn dims(&self) -> (usize, usize) {
        self.amplitude.shape()
    }

    /// Amplitude scaled so its maximum maps to `u16::MAX`.
    pub fn amplitude_image(&self) -> Gray16Image {
        let max = self.amplitude.iter().copied().fold(0.0_f64, f64::max);
        let scale = if max > 0.0 { u16::MAX as f64 / max } else { 0.0 };
        to_gray16(&self.amplitude, |v| v * scale)
    }

    /// Phase mapped linearly from `[-π, π]` onto the full 16-bit range.
    pub fn phase_image(&self) -> Gray16Image {
        to_gray16(&self.phase, phase_to_level)
    }

    /// Pupil phase, same mapping as [`Self::phase_image`].
    pub fn pupil_phase_image(&self) -> Gray16Image {
        to_gray16(&self.pupil.map(|p| p.arg()), phase_to_level)
    }
}

fn phase_to_level(phase: f64) -> f64 {
    (phase + PI) / (2.0 * PI) * u16::MAX as f64
}

fn to_gray16(data: &DMatrix<f64>, level: impl Fn(f64) -> f64) -> Gray16Image {
    let (rows, cols) = data.shape();
    ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
        let v = level(data[(y as usize, x as usize)]);
        Luma([v.round().clamp(0.0, u16::MAX as f64) as u16])
    })
}

/// Bring the spectrum back to real space and split it into amplitude and
/// phase.
pub(crate) fn extract(
    spectrum: HighResSpectrum,
    pupil: DMatrix<Complex64>,
    fft: &mut Fft2,
    report: RunReport,
) -> ReconstructionResult {
    let mut field = ifftshift(spectrum.as_matrix());
    fft.inverse(&mut field);
    ReconstructionResult {
        amplitude: field.map(|z| z.norm()),
        phase: field.map(|z| z.arg()),
        pupil,
        report,
    }
}
