//! Illumination geometry: where each capture's sub-spectrum sits on the
//! high-resolution frequency grid.
//!
//! The grid shares its frequency spacing with the low-resolution frames
//! (`2π / (n · dpix)` per pixel) and extends `upsample` times further. A
//! plane wave with direction sines `(sx, sy)` shifts the object spectrum so
//! that the objective pupil samples it around `(-k0·sx, -k0·sy)`; that point
//! is snapped to the nearest grid index.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::dataset::IlluminationSet;
use crate::error::{ReconstructError, Result};
use crate::optics::OpticalSystem;

/// Integer center of one frame's sub-spectrum window on the high-resolution
/// grid (`u` = column, `v` = row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IlluminationOffset {
    /// Index of the frame in the input stack.
    pub frame: usize,
    pub u: usize,
    pub v: usize,
}

impl IlluminationOffset {
    /// Top-left corner `(row, col)` of a `rows x cols` window centered here.
    pub fn window_origin(&self, rows: usize, cols: usize) -> (usize, usize) {
        (self.v - rows / 2, self.u - cols / 2)
    }
}

/// Maps illumination directions onto the upsampled frequency grid.
#[derive(Debug, Clone)]
pub struct GeometryMapper {
    k0: f64,
    frame_dims: (usize, usize),
    axis_x: Vec<f64>,
    axis_y: Vec<f64>,
}

impl GeometryMapper {
    /// Build the frequency axes for `frame_dims = (rows, cols)` frames.
    pub fn new(system: &OpticalSystem, frame_dims: (usize, usize), upsample: usize) -> Result<Self> {
        system.validate()?;
        if upsample == 0 {
            return Err(ReconstructError::config("upsample factor must be at least 1"));
        }
        let (rows, cols) = frame_dims;
        let dpix = system.sample_pixel_um();
        let grid_rows = rows
            .checked_mul(upsample)
            .ok_or_else(|| ReconstructError::config("upsampled grid size overflows"))?;
        let grid_cols = cols
            .checked_mul(upsample)
            .ok_or_else(|| ReconstructError::config("upsampled grid size overflows"))?;
        Ok(Self {
            k0: system.k0(),
            frame_dims,
            axis_x: frequency_axis(grid_cols, cols, dpix),
            axis_y: frequency_axis(grid_rows, rows, dpix),
        })
    }

    /// High-resolution grid size `(rows, cols)`.
    pub fn grid_dims(&self) -> (usize, usize) {
        (self.axis_y.len(), self.axis_x.len())
    }

    pub fn axis_x(&self) -> &[f64] {
        &self.axis_x
    }

    pub fn axis_y(&self) -> &[f64] {
        &self.axis_y
    }

    /// Offset for one illumination direction.
    ///
    /// Fails with [`ReconstructError::Geometry`] when the frame-sized window
    /// around the snapped center leaves the grid.
    pub fn offset(&self, frame: usize, direction: [f64; 2]) -> Result<IlluminationOffset> {
        let u = nearest_index(&self.axis_x, self.k0 * -direction[0]);
        let v = nearest_index(&self.axis_y, self.k0 * -direction[1]);
        let (rows, cols) = self.frame_dims;
        let (grid_rows, grid_cols) = self.grid_dims();
        // window spans [center - n/2, center - n/2 + n)
        let fits = u >= cols / 2
            && u + (cols - cols / 2) <= grid_cols
            && v >= rows / 2
            && v + (rows - rows / 2) <= grid_rows;
        if !fits {
            return Err(ReconstructError::Geometry {
                frame,
                u,
                v,
                rows: grid_rows,
                cols: grid_cols,
            });
        }
        Ok(IlluminationOffset { frame, u, v })
    }

    /// Offsets for the frames listed in `order`, in that order.
    pub fn offsets(
        &self,
        illumination: &IlluminationSet,
        order: &[usize],
    ) -> Result<Vec<IlluminationOffset>> {
        order
            .iter()
            .map(|&i| self.offset(i, illumination.direction(i)))
            .collect()
    }

    /// Index of the zero-frequency bin `(row, col)`.
    pub fn dc_index(&self) -> (usize, usize) {
        let (rows, cols) = self.grid_dims();
        (rows / 2, cols / 2)
    }
}

/// Linear ramp `[-n_up/2, n_up/2)` scaled to rad/um for a grid whose
/// frequency spacing is set by `n_low` pixels of size `dpix`.
fn frequency_axis(n_up: usize, n_low: usize, dpix: f64) -> Vec<f64> {
    let start = -((n_up / 2) as i64);
    (0..n_up as i64)
        .map(|i| (start + i) as f64 / (n_low as f64 * dpix) * (2.0 * PI))
        .collect()
}

/// First index minimizing `|axis[i] - target|`.
fn nearest_index(axis: &[f64], target: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &f) in axis.iter().enumerate() {
        let d = (f - target).abs();
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
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
    fn axis_is_centered_ramp() {
        let mapper = GeometryMapper::new(&system(), (64, 64), 2).unwrap();
        assert_eq!(mapper.grid_dims(), (128, 128));
        assert_eq!(mapper.axis_x()[64], 0.0);
        let step = mapper.axis_x()[65] - mapper.axis_x()[64];
        assert_abs_diff_eq!(step, 2.0 * PI / 64.0, epsilon = 1e-12);
        assert_eq!(mapper.dc_index(), (64, 64));
    }

    #[test]
    fn on_grid_angle_round_trips_exactly() {
        let sys = system();
        let mapper = GeometryMapper::new(&sys, (64, 64), 2).unwrap();
        for (j, i) in [(60usize, 70usize), (64, 64), (51, 77)] {
            let sx = -mapper.axis_x()[j] / sys.k0();
            let sy = -mapper.axis_y()[i] / sys.k0();
            let off = mapper.offset(3, [sx, sy]).unwrap();
            assert_eq!((off.u, off.v, off.frame), (j, i, 3));
        }
    }

    #[test]
    fn matched_illumination_snaps_to_pupil_edge() {
        let sys = system();
        let mapper = GeometryMapper::new(&sys, (64, 64), 2).unwrap();
        let off = mapper.offset(0, [sys.numerical_aperture, 0.0]).unwrap();
        assert_eq!((off.u, off.v), (56, 64));
        assert_eq!(off.window_origin(64, 64), (32, 24));
    }

    #[test]
    fn ties_resolve_to_first_index() {
        let axis = [-1.0, 0.0, 1.0];
        assert_eq!(nearest_index(&axis, 0.5), 1);
        assert_eq!(nearest_index(&axis, -0.5), 0);
    }

    #[test]
    fn steep_angle_is_a_geometry_error() {
        let mapper = GeometryMapper::new(&system(), (64, 64), 2).unwrap();
        let err = mapper.offset(7, [0.3, 0.0]).unwrap_err();
        match err {
            ReconstructError::Geometry { frame, rows, cols, .. } => {
                assert_eq!(frame, 7);
                assert_eq!((rows, cols), (128, 128));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn odd_frame_window_must_end_inside_grid() {
        // 15x15 frames on a 30x30 grid: the window ends at v - 7 + 15.
        let mapper = GeometryMapper::new(&system(), (15, 15), 2).unwrap();
        let edge = mapper.offset(0, [0.0, -7.0 / 30.0]).unwrap();
        assert_eq!((edge.u, edge.v), (15, 22));
        assert_eq!(edge.window_origin(15, 15), (15, 8));

        let err = mapper.offset(1, [0.0, -8.0 / 30.0]).unwrap_err();
        match err {
            ReconstructError::Geometry { frame, u, v, .. } => {
                assert_eq!((frame, u, v), (1, 15, 23));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn zero_upsample_is_rejected() {
        assert!(GeometryMapper::new(&system(), (64, 64), 0).is_err());
    }
}
