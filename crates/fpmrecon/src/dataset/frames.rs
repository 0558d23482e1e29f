use image::{ImageBuffer, Luma};
use nalgebra::DMatrix;

use super::Roi;
use crate::error::{ReconstructError, Result};

/// Ordered stack of real-valued intensity frames with identical dimensions.
///
/// Frames are stored as `rows x cols` matrices (row = y, column = x).
#[derive(Debug, Clone)]
pub struct FrameStack {
    frames: Vec<DMatrix<f64>>,
}

impl FrameStack {
    /// Build a stack, rejecting empty, ragged, negative or non-finite input.
    pub fn new(frames: Vec<DMatrix<f64>>) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(ReconstructError::config("frame stack is empty"));
        };
        let dims = first.shape();
        if dims.0 == 0 || dims.1 == 0 {
            return Err(ReconstructError::config("frames have zero size"));
        }
        for (i, frame) in frames.iter().enumerate() {
            if frame.shape() != dims {
                return Err(ReconstructError::config(format!(
                    "frame {i} is {}x{}, expected {}x{}",
                    frame.nrows(),
                    frame.ncols(),
                    dims.0,
                    dims.1
                )));
            }
            if frame.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(ReconstructError::config(format!(
                    "frame {i} contains negative or non-finite intensities"
                )));
            }
        }
        Ok(Self { frames })
    }

    /// Convert 16-bit grayscale captures into intensity frames.
    pub fn from_luma16(images: &[ImageBuffer<Luma<u16>, Vec<u16>>]) -> Result<Self> {
        let frames = images
            .iter()
            .map(|img| {
                let (w, h) = img.dimensions();
                DMatrix::from_fn(h as usize, w as usize, |r, c| {
                    img.get_pixel(c as u32, r as u32)[0] as f64
                })
            })
            .collect();
        Self::new(frames)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame dimensions `(rows, cols)`.
    pub fn dims(&self) -> (usize, usize) {
        self.frames[0].shape()
    }

    pub fn frame(&self, index: usize) -> &DMatrix<f64> {
        &self.frames[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &DMatrix<f64>> {
        self.frames.iter()
    }

    /// Largest intensity over the frames listed in `indices`.
    pub fn max_over(&self, indices: &[usize]) -> f64 {
        indices
            .iter()
            .flat_map(|&i| self.frames[i].iter())
            .fold(0.0_f64, |acc, &v| acc.max(v))
    }

    /// Crop all frames to a square region of interest.
    pub fn crop(&self, roi: &Roi) -> Result<Self> {
        let (rows, cols) = self.dims();
        roi.check_within(rows, cols)?;
        let frames = self
            .frames
            .iter()
            .map(|f| {
                f.view((roi.y_offset, roi.x_offset), (roi.size, roi.size))
                    .into_owned()
            })
            .collect();
        Ok(Self { frames })
    }
}
