use thiserror::Error;

/// Errors surfaced by a reconstruction run.
///
/// Geometry and configuration problems are detected before any iteration
/// starts; no partial result is produced for them.
#[derive(Debug, Error)]
pub enum ReconstructError {
    /// An illumination's sub-spectrum window does not fit on the
    /// high-resolution grid.
    #[error(
        "illumination {frame} maps to spectrum center (u={u}, v={v}) whose window exceeds the {rows}x{cols} grid"
    )]
    Geometry {
        /// Index of the offending frame in the input stack.
        frame: usize,
        /// Snapped window center column.
        u: usize,
        /// Snapped window center row.
        v: usize,
        /// High-resolution grid rows.
        rows: usize,
        /// High-resolution grid columns.
        cols: usize,
    },
    /// Malformed or inconsistent inputs or parameters.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The high-resolution grid could not be allocated.
    ///
    /// Only the initial grid reservation is fallible. Later working buffers
    /// of the same size (FFT transposes, quadrant shifts, extraction) are
    /// allocated normally and abort the process on exhaustion.
    #[error("failed to allocate a {rows}x{cols} spectrum grid")]
    Allocation { rows: usize, cols: usize },
    /// The caller's cancellation flag was observed between iterations.
    #[error("reconstruction cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },
}

impl ReconstructError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ReconstructError>;
