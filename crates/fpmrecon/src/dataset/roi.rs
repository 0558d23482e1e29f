use serde::{Deserialize, Serialize};

use crate::error::{ReconstructError, Result};

/// Square region of interest in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    /// Left column of the region.
    pub x_offset: usize,
    /// Top row of the region.
    pub y_offset: usize,
    /// Side length in pixels.
    pub size: usize,
}

impl Roi {
    /// Region of `size` centered in a `rows x cols` frame.
    pub fn centered(rows: usize, cols: usize, size: usize) -> Self {
        Self {
            x_offset: cols.saturating_sub(size) / 2,
            y_offset: rows.saturating_sub(size) / 2,
            size,
        }
    }

    pub(crate) fn check_within(&self, rows: usize, cols: usize) -> Result<()> {
        let fits = self.size > 0
            && self.x_offset.checked_add(self.size).is_some_and(|end| end <= cols)
            && self.y_offset.checked_add(self.size).is_some_and(|end| end <= rows);
        if fits {
            Ok(())
        } else {
            Err(ReconstructError::config(format!(
                "roi ({}, {}, size {}) exceeds {rows}x{cols} frames",
                self.x_offset, self.y_offset, self.size
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_roi_fits() {
        let roi = Roi::centered(100, 120, 64);
        assert_eq!(roi.x_offset, 28);
        assert_eq!(roi.y_offset, 18);
        assert!(roi.check_within(100, 120).is_ok());
    }

    #[test]
    fn out_of_bounds_roi_is_rejected() {
        let roi = Roi {
            x_offset: 50,
            y_offset: 0,
            size: 64,
        };
        assert!(roi.check_within(100, 100).is_err());
    }

    #[test]
    fn overflowing_roi_is_rejected() {
        let roi = Roi {
            x_offset: usize::MAX,
            y_offset: 0,
            size: 2,
        };
        assert!(matches!(
            roi.check_within(100, 100),
            Err(ReconstructError::Configuration(_))
        ));
        let roi = Roi {
            x_offset: 0,
            y_offset: 1,
            size: usize::MAX,
        };
        assert!(roi.check_within(100, 100).is_err());
    }
}
