//! Field recovery from a single NA-matched intensity frame.
//!
//! When the illumination puts the object's zero frequency on the pupil edge,
//! the demodulated field `h` has its spectrum inside a half-plane, and so
//! does `log h` for a dominant zero-frequency term. The imaginary part of
//! `log h` then follows from its real part `½·ln I` by a one-sided spectral
//! mask.

use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::fft::{signed_bin, Fft2};

/// Intensity floor under the logarithm.
const LOG_FLOOR: f64 = 1e-12;

/// Complex field whose intensity is `intensity` and whose zero frequency sits
/// at FFT bin `dc = (dx, dy)` (columns, rows; signed).
pub(crate) fn recover_field(
    intensity: &DMatrix<f64>,
    dc: (i64, i64),
    fft: &mut Fft2,
) -> DMatrix<Complex64> {
    let (rows, cols) = intensity.shape();
    let mut log_field = intensity.map(|i| Complex64::new(0.5 * i.max(LOG_FLOOR).ln(), 0.0));
    fft.forward(&mut log_field);
    let mask = half_plane_mask(rows, cols, dc);
    log_field.component_mul_assign(&mask);
    fft.inverse(&mut log_field);

    let (dx, dy) = dc;
    DMatrix::from_fn(rows, cols, |r, c| {
        let carrier = 2.0 * PI * (dx as f64 * c as f64 / cols as f64 + dy as f64 * r as f64 / rows as f64);
        log_field[(r, c)].exp() * Complex64::from_polar(1.0, carrier)
    })
}

/// `2` on the open half-plane `k·dc < 0`, `1` on its boundary line, `0`
/// elsewhere, in unshifted FFT layout.
fn half_plane_mask(rows: usize, cols: usize, (dx, dy): (i64, i64)) -> DMatrix<Complex64> {
    let (h2, w2) = ((rows * rows) as i64, (cols * cols) as i64);
    DMatrix::from_fn(rows, cols, |r, c| {
        let kx = signed_bin(c, cols);
        let ky = signed_bin(r, rows);
        // physical dot product scaled by rows²·cols²
        let dot = kx * dx * h2 + ky * dy * w2;
        let w = match dot.signum() {
            -1 => 2.0,
            0 => 1.0,
            _ => 0.0,
        };
        Complex64::new(w, 0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    #[test]
    fn mask_splits_along_the_dc_direction() {
        let m = half_plane_mask(8, 8, (3, 0));
        assert_eq!(m[(0, 0)].re, 1.0);
        assert_eq!(m[(5, 0)].re, 1.0);
        assert_eq!(m[(0, 7)].re, 2.0);
        assert_eq!(m[(2, 2)].re, 0.0);
        // Nyquist column counts as negative frequency
        assert_eq!(m[(1, 4)].re, 2.0);
    }

    #[test]
    fn recovers_two_tone_field() {
        let n = 32;
        let mut planner = FftPlanner::new();
        let mut fft = Fft2::new(&mut planner, n, n);
        let dc = (4_i64, 0_i64);
        let tone = |r: usize, c: usize, kx: f64, ky: f64| {
            Complex64::from_polar(1.0, 2.0 * PI * (kx * c as f64 + ky * r as f64) / n as f64)
        };
        // zero frequency at +4 columns, a weaker tone at (+1, +2)
        let field = DMatrix::from_fn(n, n, |r, c| {
            tone(r, c, 4.0, 0.0) * 0.9 + tone(r, c, 1.0, 2.0) * Complex64::new(0.04, 0.03)
        });
        let intensity = field.map(|z| z.norm_sqr());
        let recovered = recover_field(&intensity, dc, &mut fft);
        let err = recovered
            .iter()
            .zip(field.iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max);
        assert!(err < 1e-6, "max error {err}");
    }
}
