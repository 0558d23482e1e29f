//! Pupil function: a fixed binary aperture plus a mutable complex
//! correction layer.

use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::{ReconstructError, Result};
use crate::optics::OpticalSystem;

/// Damping constant of the pupil update denominator.
const PUPIL_UPDATE_DAMPING: f64 = 1000.0;

/// Current pupil estimate on the low-resolution frequency grid
/// (baseband-centered layout, zero frequency at `(rows/2, cols/2)`).
#[derive(Debug, Clone)]
pub struct PupilModel {
    aperture: DMatrix<f64>,
    pupil: DMatrix<Complex64>,
}

impl PupilModel {
    /// Aperture `|k| <= NA·k0` on a `rows x cols` frame grid, with a neutral
    /// correction layer.
    pub fn new(system: &OpticalSystem, dims: (usize, usize)) -> Result<Self> {
        system.validate()?;
        if dims.0 == 0 || dims.1 == 0 {
            return Err(ReconstructError::config("pupil grid has zero size"));
        }
        let aperture = aperture_mask(system, dims);
        let pupil = aperture.map(|v| Complex64::new(v, 0.0));
        Ok(Self { aperture, pupil })
    }

    /// Fixed binary support mask.
    pub fn aperture(&self) -> &DMatrix<f64> {
        &self.aperture
    }

    /// Current complex pupil estimate.
    pub fn pupil(&self) -> &DMatrix<Complex64> {
        &self.pupil
    }

    pub fn into_pupil(self) -> DMatrix<Complex64> {
        self.pupil
    }

    /// Fraction of frequency samples inside the aperture.
    pub fn support_fraction(&self) -> f64 {
        self.aperture.iter().filter(|&&v| v > 0.0).count() as f64 / self.aperture.len() as f64
    }

    /// Whether sample `(row, col)` lies inside the aperture.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.aperture[(row, col)] > 0.0
    }

    /// Per-sample weight applied to spectrum corrections:
    /// `|P|·conj(P) / (max|P| · (|P|² + 1)) · aperture`.
    ///
    /// Returns `None` when the pupil has vanished everywhere.
    pub fn spectrum_weight(&self) -> Option<DMatrix<Complex64>> {
        let max_abs = self.pupil.iter().map(|p| p.norm()).fold(0.0, f64::max);
        if max_abs == 0.0 {
            return None;
        }
        Some(self.pupil.zip_map(&self.aperture, |p, a| {
            let mag = p.norm();
            p.conj() * (mag / (max_abs * (mag * mag + 1.0))) * a
        }))
    }

    /// Step-scaled pupil correction from one illumination's spectral update.
    ///
    /// `window_max` is the largest magnitude of the high-resolution window the
    /// correction was derived from; a zero maximum skips the update.
    pub fn apply_correction(
        &mut self,
        diff: &DMatrix<Complex64>,
        before: &DMatrix<Complex64>,
        window_max: f64,
        beta: f64,
    ) {
        if window_max == 0.0 {
            return;
        }
        for ((p, (d, g)), a) in self
            .pupil
            .iter_mut()
            .zip(diff.iter().zip(before.iter()))
            .zip(self.aperture.iter())
        {
            let mag = g.norm();
            let scale = beta * mag / window_max / (mag * mag + PUPIL_UPDATE_DAMPING) * *a;
            *p += d * g.conj() * scale;
        }
    }

    /// Reset the correction layer to unit magnitude inside the aperture,
    /// keeping the accumulated phase.
    pub fn reset_magnitude(&mut self) {
        for (p, a) in self.pupil.iter_mut().zip(self.aperture.iter()) {
            *p = Complex64::from_polar(*a, p.arg());
        }
    }
}

fn aperture_mask(system: &OpticalSystem, (rows, cols): (usize, usize)) -> DMatrix<f64> {
    let dpix = system.sample_pixel_um();
    let kmax = system.kmax();
    let kmax2 = kmax * kmax;
    DMatrix::from_fn(rows, cols, |r, c| {
        let fx = (c as f64 - (cols / 2) as f64) / (cols as f64 * dpix) * (2.0 * PI);
        let fy = (r as f64 - (rows / 2) as f64) / (rows as f64 * dpix) * (2.0 * PI);
        if fx * fx + fy * fy <= kmax2 {
            1.0
        } else {
            0.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn system(na: f64) -> OpticalSystem {
        OpticalSystem {
            numerical_aperture: na,
            wavelength_um: 0.5,
            camera_pixel_um: 10.0,
            magnification: 10.0,
        }
    }

    #[test]
    fn aperture_radius_matches_na() {
        // radius in pixels = NA * n * dpix / lambda = 8
        let pupil = PupilModel::new(&system(0.0625), (64, 64)).unwrap();
        assert!(pupil.contains(32, 32 + 8));
        assert!(pupil.contains(32 - 8, 32));
        assert!(!pupil.contains(32, 32 + 9));
        assert!(!pupil.contains(32 + 6, 32 + 6));
        let area = pupil.support_fraction() * 64.0 * 64.0;
        assert_abs_diff_eq!(area, PI * 64.0, epsilon = 20.0);
    }

    #[test]
    fn sixty_percent_support() {
        let pupil = PupilModel::new(&system(0.2185), (64, 64)).unwrap();
        let frac = pupil.support_fraction();
        assert!((0.55..0.65).contains(&frac), "fraction {frac}");
    }

    #[test]
    fn invalid_system_is_rejected() {
        assert!(PupilModel::new(&system(0.0), (16, 16)).is_err());
        assert!(PupilModel::new(&system(0.1), (0, 16)).is_err());
    }

    #[test]
    fn uniform_pupil_weight_is_half() {
        let pupil = PupilModel::new(&system(0.0625), (32, 32)).unwrap();
        let w = pupil.spectrum_weight().unwrap();
        assert!((w[(16, 16)] - Complex64::new(0.5, 0.0)).norm() < 1e-15);
        assert_eq!(w[(0, 0)], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn reset_keeps_phase_and_support() {
        let mut pupil = PupilModel::new(&system(0.0625), (32, 32)).unwrap();
        pupil.pupil[(16, 16)] = Complex64::from_polar(2.5, 0.3);
        pupil.pupil[(0, 0)] = Complex64::new(0.7, 0.1);
        pupil.reset_magnitude();
        assert_abs_diff_eq!(pupil.pupil()[(16, 16)].norm(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pupil.pupil()[(16, 16)].arg(), 0.3, epsilon = 1e-12);
        assert_eq!(pupil.pupil()[(0, 0)].norm(), 0.0);
    }

    #[test]
    fn correction_stays_inside_aperture() {
        let mut pupil = PupilModel::new(&system(0.0625), (32, 32)).unwrap();
        let diff = DMatrix::from_element(32, 32, Complex64::new(1.0, 1.0));
        let before = DMatrix::from_element(32, 32, Complex64::new(2.0, 0.0));
        pupil.apply_correction(&diff, &before, 4.0, 0.1);
        assert_eq!(pupil.pupil()[(0, 0)], Complex64::new(0.0, 0.0));
        assert!(pupil.pupil()[(16, 16)] != Complex64::new(1.0, 0.0));
    }
}
