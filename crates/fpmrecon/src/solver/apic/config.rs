use serde::{Deserialize, Serialize};

use crate::dataset::IlluminationSelection;
use crate::error::{ReconstructError, Result};

/// Configuration for the closed-form solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApicConfig {
    /// Integer upsampling factor of the reconstruction grid.
    pub upsample: usize,
    /// Relative slack below the objective NA within which an illumination
    /// still counts as NA-matched.
    ///
    /// An illumination is used when its mapped zero frequency lies inside
    /// the aperture at a radius of at least `(1 - match_tolerance)·kmax`.
    pub match_tolerance: f64,
    /// Illumination subset considered for stitching.
    pub selection: IlluminationSelection,
}

impl Default for ApicConfig {
    fn default() -> Self {
        Self {
            upsample: 3,
            match_tolerance: 0.1,
            selection: IlluminationSelection::default(),
        }
    }
}

impl ApicConfig {
    pub fn validate(&self) -> Result<()> {
        if self.upsample == 0 {
            return Err(ReconstructError::config("upsample factor must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.match_tolerance) {
            return Err(ReconstructError::config(format!(
                "match_tolerance must lie in [0, 1], got {}",
                self.match_tolerance
            )));
        }
        Ok(())
    }
}
