//! One illumination's update inside a sweep.

use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;

use crate::fft::{fftshift, ifftshift, Fft2};
use crate::geometry::IlluminationOffset;
use crate::pupil::PupilModel;
use crate::spectrum::HighResSpectrum;

/// Minimum mean intensity, both measured and modeled, for the intensity
/// constraint to be enforced on a frame.
pub(crate) const ACTIVITY_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntensityConstraint {
    Applied,
    /// Frame too dark; the modeled field was kept unchanged.
    PassedThrough,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StepParams {
    pub alpha: f64,
    pub beta: f64,
    pub pupil_correction: bool,
    /// `1 / U²`: energy scaling between the high-resolution and frame grids.
    pub energy_scale: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StepOutcome {
    /// Sum of squared amplitude mismatch before the constraint.
    pub residual: f64,
    pub constraint: IntensityConstraint,
}

/// Replace the modeled magnitude with the measured one, keeping the phase.
///
/// Pixels whose modeled intensity is exactly zero stay unchanged. The whole
/// frame passes through untouched when either mean intensity is at or below
/// [`ACTIVITY_THRESHOLD`].
pub(crate) fn apply_intensity_constraint(
    field: &mut DMatrix<Complex64>,
    measured: &DMatrix<f64>,
) -> IntensityConstraint {
    let n = measured.len() as f64;
    let measured_mean = measured.sum() / n;
    let modeled_mean = field.iter().map(|g| g.norm_sqr()).sum::<f64>() / n;
    if !(measured_mean > ACTIVITY_THRESHOLD && modeled_mean > ACTIVITY_THRESHOLD) {
        return IntensityConstraint::PassedThrough;
    }
    for (g, i) in field.iter_mut().zip(measured.iter()) {
        let modeled = g.norm();
        if modeled > 0.0 {
            *g *= i.sqrt() / modeled;
        }
    }
    IntensityConstraint::Applied
}

/// Project the current estimate through one illumination and write the
/// correction back into the spectrum and, optionally, the pupil.
pub(crate) fn update_illumination(
    spectrum: &mut HighResSpectrum,
    pupil: &mut PupilModel,
    offset: &IlluminationOffset,
    measured: &DMatrix<f64>,
    params: &StepParams,
    fft: &mut Fft2,
) -> StepOutcome {
    let (rows, cols) = measured.shape();
    let window = spectrum.window(offset, rows, cols);
    let before = window.zip_zip_map(pupil.pupil(), pupil.aperture(), |w, p, a| {
        w * p * (a * params.energy_scale)
    });

    let mut field = ifftshift(&before);
    fft.inverse(&mut field);
    let residual = field
        .iter()
        .zip(measured.iter())
        .map(|(g, i)| {
            let d = g.norm() - i.sqrt();
            d * d
        })
        .sum::<f64>();
    let constraint = apply_intensity_constraint(&mut field, measured);
    fft.forward(&mut field);
    let after = fftshift(&field);
    let diff = &after - &before;

    match pupil.spectrum_weight() {
        Some(weight) => {
            let updated = window + diff.component_mul(&weight) * Complex64::new(params.alpha, 0.0);
            spectrum.write_window(offset, &updated);
        }
        None => tracing::trace!(frame = offset.frame, "pupil vanished, spectrum update skipped"),
    }

    if params.pupil_correction {
        let window_max = spectrum
            .window(offset, rows, cols)
            .iter()
            .map(|z| z.norm())
            .fold(0.0, f64::max);
        pupil.apply_correction(&diff, &before, window_max, params.beta);
    } else {
        pupil.reset_magnitude();
    }

    tracing::trace!(
        frame = offset.frame,
        residual,
        passed_through = constraint == IntensityConstraint::PassedThrough,
        "illumination updated"
    );
    StepOutcome {
        residual,
        constraint,
    }
}
