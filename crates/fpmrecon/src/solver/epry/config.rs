use serde::{Deserialize, Serialize};

use crate::dataset::IlluminationSelection;
use crate::error::{ReconstructError, Result};

/// Configuration for the iterative engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpryConfig {
    /// Integer upsampling factor of the reconstruction grid.
    pub upsample: usize,
    /// Initial spectrum step size.
    pub alpha: f64,
    /// Initial pupil step size.
    pub beta: f64,
    /// Maximum number of global iterations (full sweeps).
    pub max_iters: usize,
    /// Co-estimate pupil aberrations.
    ///
    /// When disabled the pupil keeps unit magnitude inside the aperture and
    /// only its phase may drift.
    pub pupil_correction: bool,
    /// Illumination subset used in the sweep.
    pub selection: IlluminationSelection,
}

impl Default for EpryConfig {
    fn default() -> Self {
        Self {
            upsample: 3,
            alpha: 1.0,
            beta: 0.1,
            max_iters: 50,
            pupil_correction: false,
            selection: IlluminationSelection::default(),
        }
    }
}

impl EpryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.upsample == 0 {
            return Err(ReconstructError::config("upsample factor must be at least 1"));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(ReconstructError::config(format!(
                "alpha must be finite and positive, got {}",
                self.alpha
            )));
        }
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            return Err(ReconstructError::config(format!(
                "beta must be finite and non-negative, got {}",
                self.beta
            )));
        }
        if self.max_iters == 0 {
            return Err(ReconstructError::config("max_iters must be at least 1"));
        }
        Ok(())
    }
}
