//! Noiseless forward model: the capture stack an ideal system would record
//! from a known high-resolution object.
//!
//! Uses exactly the physics the solvers invert, so a simulated stack is a
//! consistent input for either of them.

use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

use crate::dataset::{FrameStack, IlluminationSet};
use crate::error::{ReconstructError, Result};
use crate::fft::{fftshift, ifftshift, Fft2};
use crate::geometry::GeometryMapper;
use crate::optics::OpticalSystem;
use crate::pupil::PupilModel;

/// Low-resolution intensity frames of `object` under every illumination.
///
/// `object` lives on the high-resolution grid; frames are `upsample` times
/// smaller in each dimension, so both object dimensions must be divisible
/// by `upsample`.
pub fn capture_stack(
    object: &DMatrix<Complex64>,
    system: &OpticalSystem,
    illumination: &IlluminationSet,
    upsample: usize,
) -> Result<FrameStack> {
    if upsample == 0 {
        return Err(ReconstructError::config("upsample factor must be at least 1"));
    }
    let (grid_rows, grid_cols) = object.shape();
    if grid_rows % upsample != 0 || grid_cols % upsample != 0 {
        return Err(ReconstructError::config(format!(
            "object {grid_rows}x{grid_cols} is not divisible by upsample {upsample}"
        )));
    }
    let frame_dims = (grid_rows / upsample, grid_cols / upsample);
    let mapper = GeometryMapper::new(system, frame_dims, upsample)?;
    let pupil = PupilModel::new(system, frame_dims)?;
    let order: Vec<usize> = (0..illumination.len()).collect();
    let offsets = mapper.offsets(illumination, &order)?;

    let mut planner = FftPlanner::new();
    let mut grid_fft = Fft2::new(&mut planner, grid_rows, grid_cols);
    let mut frame_fft = Fft2::new(&mut planner, frame_dims.0, frame_dims.1);

    let mut spectrum = object.clone();
    grid_fft.forward(&mut spectrum);
    let spectrum = fftshift(&spectrum);

    let energy_scale = 1.0 / (upsample * upsample) as f64;
    let frames = offsets
        .iter()
        .map(|offset| {
            let (r0, c0) = offset.window_origin(frame_dims.0, frame_dims.1);
            let window = spectrum.view((r0, c0), frame_dims);
            let filtered = window.zip_map(pupil.aperture(), |s, a| s * (a * energy_scale));
            let mut field = ifftshift(&filtered);
            frame_fft.inverse(&mut field);
            field.map(|g| g.norm_sqr())
        })
        .collect();
    tracing::debug!(
        frames = illumination.len(),
        rows = frame_dims.0,
        cols = frame_dims.1,
        "simulated capture stack"
    );
    FrameStack::new(frames)
}

/// Smooth test object: a slowly varying amplitude between roughly 0.55 and
/// 1.0 and a phase of up to about ±1 rad.
pub fn phantom(rows: usize, cols: usize) -> DMatrix<Complex64> {
    DMatrix::from_fn(rows, cols, |r, c| {
        let x = c as f64 / cols as f64;
        let y = r as f64 / rows as f64;
        let dx = x - 0.4;
        let dy = y - 0.55;
        let blob = (-(dx * dx + dy * dy) / 0.02).exp();
        let amplitude = 0.8 + 0.15 * (2.0 * PI * 3.0 * x).cos() * (2.0 * PI * 2.0 * y).cos()
            - 0.1 * blob;
        let phase = 0.6 * (2.0 * PI * (x + 2.0 * y)).sin() + 0.4 * blob;
        Complex64::from_polar(amplitude, phase)
    })
}

/// Square LED grid: `grid x grid` directions with `pitch` NA spacing,
/// centered on the optical axis, listed row by row.
pub fn grid_illumination(grid: usize, pitch: f64) -> Result<IlluminationSet> {
    let half = (grid as f64 - 1.0) / 2.0;
    let directions = (0..grid)
        .flat_map(|j| (0..grid).map(move |i| [(i as f64 - half) * pitch, (j as f64 - half) * pitch]))
        .collect();
    IlluminationSet::new(directions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn system() -> OpticalSystem {
        OpticalSystem {
            numerical_aperture: 0.0625,
            wavelength_um: 0.5,
            camera_pixel_um: 10.0,
            magnification: 10.0,
        }
    }

    #[test]
    fn flat_object_gives_flat_on_axis_frame() {
        let object = DMatrix::from_element(32, 32, Complex64::new(0.7, 0.0));
        let ill = IlluminationSet::new(vec![[0.0, 0.0]]).unwrap();
        let stack = capture_stack(&object, &system(), &ill, 2).unwrap();
        assert_eq!(stack.dims(), (16, 16));
        for v in stack.frame(0).iter() {
            assert_abs_diff_eq!(*v, 0.49, epsilon = 1e-12);
        }
    }

    #[test]
    fn tilted_flat_object_is_dark() {
        // DC falls outside the pupil once the tilt exceeds the objective NA.
        let object = DMatrix::from_element(64, 64, Complex64::new(1.0, 0.0));
        let ill = IlluminationSet::new(vec![[0.1, 0.0]]).unwrap();
        let stack = capture_stack(&object, &system(), &ill, 2).unwrap();
        assert!(stack.frame(0).iter().all(|v| *v < 1e-20));
    }

    #[test]
    fn indivisible_object_is_rejected() {
        let object = DMatrix::from_element(30, 32, Complex64::new(1.0, 0.0));
        let ill = IlluminationSet::new(vec![[0.0, 0.0]]).unwrap();
        assert!(capture_stack(&object, &system(), &ill, 4).is_err());
    }

    #[test]
    fn odd_frames_report_out_of_grid_windows() {
        let object = DMatrix::from_element(30, 30, Complex64::new(1.0, 0.0));
        let ill = IlluminationSet::new(vec![[0.0, -8.0 / 30.0]]).unwrap();
        let err = capture_stack(&object, &system(), &ill, 2).unwrap_err();
        assert!(matches!(err, ReconstructError::Geometry { v: 23, .. }), "{err}");

        let ill = IlluminationSet::new(vec![[0.0, -7.0 / 30.0]]).unwrap();
        let stack = capture_stack(&object, &system(), &ill, 2).unwrap();
        assert_eq!(stack.dims(), (15, 15));
    }

    #[test]
    fn grid_is_centered() {
        let ill = grid_illumination(3, 0.05).unwrap();
        assert_eq!(ill.len(), 9);
        assert_eq!(ill.direction(4), [0.0, 0.0]);
        assert_eq!(ill.direction(0), [-0.05, -0.05]);
        assert_eq!(ill.direction(5), [0.05, 0.0]);
    }

    #[test]
    fn phantom_amplitude_is_positive() {
        let p = phantom(32, 48);
        assert_eq!(p.shape(), (32, 48));
        assert!(p.iter().all(|z| z.norm() > 0.5 && z.norm() < 1.0));
    }
}
