//! Shared helpers for synthetic-data unit tests.

use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::dataset::IlluminationSet;
use crate::optics::OpticalSystem;

/// System with a unit sample pixel (`10 um / 10x`) at 0.5 um wavelength.
///
/// Pupil radius in frame pixels is `na * n / 0.5` for `n x n` frames.
pub(crate) fn system(na: f64) -> OpticalSystem {
    OpticalSystem {
        numerical_aperture: na,
        wavelength_um: 0.5,
        camera_pixel_um: 10.0,
        magnification: 10.0,
    }
}

/// `count` identical on-axis illuminations.
pub(crate) fn on_axis(count: usize) -> IlluminationSet {
    IlluminationSet::new(vec![[0.0, 0.0]; count]).expect("finite directions")
}

/// Real, positive object band-limited to a few low spatial frequencies on an
/// `n x n` grid.
pub(crate) fn band_limited_object(n: usize) -> DMatrix<Complex64> {
    let nf = n as f64;
    DMatrix::from_fn(n, n, |r, c| {
        let (x, y) = (c as f64, r as f64);
        let v = 1.0
            + 0.15 * (2.0 * PI * 3.0 * x / nf).cos()
            + 0.1 * (2.0 * PI * (5.0 * x + 2.0 * y) / nf).cos();
        Complex64::new(v, 0.0)
    })
}

/// Largest absolute deviation after rescaling `recon` to the mean of `truth`.
pub(crate) fn scale_normalized_error(recon: &DMatrix<f64>, truth: &DMatrix<f64>) -> f64 {
    assert_eq!(recon.shape(), truth.shape());
    let k = truth.mean() / recon.mean();
    recon
        .iter()
        .zip(truth.iter())
        .map(|(a, b)| (k * a - b).abs())
        .fold(0.0, f64::max)
}

/// Largest wrapped phase difference.
pub(crate) fn max_phase_error(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    assert_eq!(a.shape(), b.shape());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d.sin().atan2(d.cos()).abs()
        })
        .fold(0.0, f64::max)
}

pub(crate) fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Root-mean-square deviation after rescaling `recon` to the mean of `truth`.
pub(crate) fn rms_scaled_error(recon: &DMatrix<f64>, truth: &DMatrix<f64>) -> f64 {
    assert_eq!(recon.shape(), truth.shape());
    let k = truth.mean() / recon.mean();
    let sum: f64 = recon
        .iter()
        .zip(truth.iter())
        .map(|(a, b)| (k * a - b).powi(2))
        .sum();
    (sum / truth.len() as f64).sqrt()
}

/// Root-mean-square wrapped phase difference after removing the circular
/// mean offset.
pub(crate) fn rms_phase_error(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    assert_eq!(a.shape(), b.shape());
    let wrap = |d: f64| d.sin().atan2(d.cos());
    let (s, c) = a
        .iter()
        .zip(b.iter())
        .fold((0.0, 0.0), |(s, c), (x, y)| (s + (x - y).sin(), c + (x - y).cos()));
    let offset = s.atan2(c);
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| wrap(x - y - offset).powi(2))
        .sum();
    (sum / a.len() as f64).sqrt()
}
