//! High-resolution object spectrum and its initial estimate.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use nalgebra::{DMatrix, Scalar};
use rustfft::num_complex::Complex64;

use crate::error::{ReconstructError, Result};
use crate::fft::{fftshift, Fft2};
use crate::geometry::IlluminationOffset;

/// Complex object spectrum on the upsampled grid, baseband-centered.
#[derive(Debug, Clone)]
pub struct HighResSpectrum {
    data: DMatrix<Complex64>,
}

impl HighResSpectrum {
    /// Zero spectrum of `rows x cols`; allocation failure is reported, not
    /// aborted on.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        Ok(Self {
            data: try_filled(rows, cols, Complex64::new(0.0, 0.0))?,
        })
    }

    pub fn from_matrix(data: DMatrix<Complex64>) -> Self {
        Self { data }
    }

    pub fn dims(&self) -> (usize, usize) {
        self.data.shape()
    }

    pub fn as_matrix(&self) -> &DMatrix<Complex64> {
        &self.data
    }

    pub fn into_matrix(self) -> DMatrix<Complex64> {
        self.data
    }

    /// Copy of the `rows x cols` window centered at `offset`.
    pub fn window(&self, offset: &IlluminationOffset, rows: usize, cols: usize) -> DMatrix<Complex64> {
        let (r0, c0) = offset.window_origin(rows, cols);
        self.data.view((r0, c0), (rows, cols)).into_owned()
    }

    /// Overwrite the window centered at `offset` with `values`.
    pub fn write_window(&mut self, offset: &IlluminationOffset, values: &DMatrix<Complex64>) {
        let (rows, cols) = values.shape();
        let (r0, c0) = offset.window_origin(rows, cols);
        self.data.view_mut((r0, c0), (rows, cols)).copy_from(values);
    }

    /// Multiply element-wise by a real mask of the same shape.
    pub fn mask_in_place(&mut self, mask: &DMatrix<f64>) {
        for (s, m) in self.data.iter_mut().zip(mask.iter()) {
            *s *= *m;
        }
    }
}

/// Seed the high-resolution spectrum from the reference capture.
///
/// The normalized reference intensity is upsampled with a triangle filter,
/// square-rooted into an amplitude with zero phase, transformed and shifted
/// to the centered layout.
pub(crate) fn initial_spectrum(
    reference: &DMatrix<f64>,
    upsample: usize,
    fft: &mut Fft2,
) -> Result<HighResSpectrum> {
    let (rows, cols) = reference.shape();
    let (grid_rows, grid_cols) = fft.shape();
    debug_assert_eq!((grid_rows, grid_cols), (rows * upsample, cols * upsample));

    let mut spectrum = HighResSpectrum::zeros(grid_rows, grid_cols)?;
    let upsampled = upsample_intensity(reference, grid_rows, grid_cols);
    for (s, v) in spectrum.data.iter_mut().zip(upsampled.iter()) {
        *s = Complex64::new(v.max(0.0).sqrt(), 0.0);
    }
    fft.forward(&mut spectrum.data);
    spectrum.data = fftshift(&spectrum.data);
    Ok(spectrum)
}

/// `rows x cols` matrix filled with `value`, reporting allocation failure
/// instead of aborting.
pub(crate) fn try_filled<T: Scalar>(rows: usize, cols: usize, value: T) -> Result<DMatrix<T>> {
    let len = rows
        .checked_mul(cols)
        .ok_or(ReconstructError::Allocation { rows, cols })?;
    let mut buf: Vec<T> = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| ReconstructError::Allocation { rows, cols })?;
    buf.resize(len, value);
    Ok(DMatrix::from_vec(rows, cols, buf))
}

/// Bilinear (triangle) upsampling for the initial guess. Samples are
/// pixel-center aligned and pass through `f32`, which is ample precision for
/// a starting estimate.
fn upsample_intensity(frame: &DMatrix<f64>, rows: usize, cols: usize) -> DMatrix<f64> {
    if frame.shape() == (rows, cols) {
        return frame.clone();
    }
    let (h, w) = frame.shape();
    let src: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
            Luma([frame[(y as usize, x as usize)] as f32])
        });
    let up = imageops::resize(&src, cols as u32, rows as u32, FilterType::Triangle);
    DMatrix::from_fn(rows, cols, |r, c| up.get_pixel(c as u32, r as u32)[0] as f64)
}
