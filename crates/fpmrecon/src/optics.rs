use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{ReconstructError, Result};

/// Physical parameters of the imaging system.
///
/// Lengths are in micrometers; spatial frequencies derived from them are in
/// radians per micrometer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpticalSystem {
    /// Objective numerical aperture.
    pub numerical_aperture: f64,
    /// Illumination wavelength (um).
    pub wavelength_um: f64,
    /// Camera pixel pitch (um).
    pub camera_pixel_um: f64,
    /// Total magnification between sample and camera.
    pub magnification: f64,
}

impl Default for OpticalSystem {
    fn default() -> Self {
        Self {
            numerical_aperture: 0.1,
            wavelength_um: 0.5,
            camera_pixel_um: 3.45,
            magnification: 10.0,
        }
    }
}

impl OpticalSystem {
    /// Pixel size projected onto the sample plane.
    pub fn sample_pixel_um(&self) -> f64 {
        self.camera_pixel_um / self.magnification
    }

    /// Free-space wavenumber `2π/λ`.
    pub fn k0(&self) -> f64 {
        2.0 * PI / self.wavelength_um
    }

    /// Cutoff frequency of the coherent transfer function.
    pub fn kmax(&self) -> f64 {
        self.numerical_aperture * self.k0()
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("numerical_aperture", self.numerical_aperture),
            ("wavelength_um", self.wavelength_um),
            ("camera_pixel_um", self.camera_pixel_um),
            ("magnification", self.magnification),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(ReconstructError::config(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}
