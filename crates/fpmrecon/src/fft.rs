//! Two-dimensional FFT over `DMatrix` buffers and quadrant shifting.
//!
//! `DMatrix` is column-major, so columns are contiguous and transformed in
//! one batched call; rows are transformed on a transposed copy.

use std::sync::Arc;

use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

/// Planned forward/inverse 2D transforms for one `rows x cols` shape.
///
/// The inverse is normalized by `1 / (rows * cols)`, so
/// `inverse(forward(x)) == x` up to rounding.
pub(crate) struct Fft2 {
    rows: usize,
    cols: usize,
    col_fwd: Arc<dyn Fft<f64>>,
    col_inv: Arc<dyn Fft<f64>>,
    row_fwd: Arc<dyn Fft<f64>>,
    row_inv: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl Fft2 {
    pub fn new(planner: &mut FftPlanner<f64>, rows: usize, cols: usize) -> Self {
        let col_fwd = planner.plan_fft_forward(rows);
        let col_inv = planner.plan_fft_inverse(rows);
        let row_fwd = planner.plan_fft_forward(cols);
        let row_inv = planner.plan_fft_inverse(cols);
        let scratch_len = [&col_fwd, &col_inv, &row_fwd, &row_inv]
            .iter()
            .map(|p| p.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);
        Self {
            rows,
            cols,
            col_fwd,
            col_inv,
            row_fwd,
            row_inv,
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn forward(&mut self, data: &mut DMatrix<Complex64>) {
        let (col, row) = (Arc::clone(&self.col_fwd), Arc::clone(&self.row_fwd));
        self.transform(data, col.as_ref(), row.as_ref());
    }

    pub fn inverse(&mut self, data: &mut DMatrix<Complex64>) {
        let (col, row) = (Arc::clone(&self.col_inv), Arc::clone(&self.row_inv));
        self.transform(data, col.as_ref(), row.as_ref());
        let norm = 1.0 / (self.rows * self.cols) as f64;
        data.apply(|z| *z *= norm);
    }

    fn transform(&mut self, data: &mut DMatrix<Complex64>, col: &dyn Fft<f64>, row: &dyn Fft<f64>) {
        debug_assert_eq!(data.shape(), (self.rows, self.cols));
        col.process_with_scratch(data.as_mut_slice(), &mut self.scratch);
        let mut transposed = data.transpose();
        row.process_with_scratch(transposed.as_mut_slice(), &mut self.scratch);
        transposed.transpose_to(data);
    }
}

/// Swap quadrants so the zero-frequency bin moves to `(rows/2, cols/2)`.
pub(crate) fn fftshift<T: nalgebra::Scalar>(data: &DMatrix<T>) -> DMatrix<T> {
    let (rows, cols) = data.shape();
    let (hr, hc) = (rows / 2, cols / 2);
    DMatrix::from_fn(rows, cols, |r, c| {
        data[((r + rows - hr) % rows, (c + cols - hc) % cols)].clone()
    })
}

/// Inverse of [`fftshift`]; identical to it for even dimensions.
pub(crate) fn ifftshift<T: nalgebra::Scalar>(data: &DMatrix<T>) -> DMatrix<T> {
    let (rows, cols) = data.shape();
    let (hr, hc) = (rows / 2, cols / 2);
    DMatrix::from_fn(rows, cols, |r, c| data[((r + hr) % rows, (c + hc) % cols)].clone())
}

/// Signed frequency index of FFT bin `k` on an axis of length `n`.
pub(crate) fn signed_bin(k: usize, n: usize) -> i64 {
    if k < n.div_ceil(2) {
        k as i64
    } else {
        k as i64 - n as i64
    }
}

pub(crate) fn to_complex(data: &DMatrix<f64>) -> DMatrix<Complex64> {
    data.map(|v| Complex64::new(v, 0.0))
}
