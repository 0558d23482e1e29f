//! Captured inputs: the intensity stack, the illumination directions and the
//! optical system they were recorded with.

mod frames;
mod illumination;
mod roi;

pub use frames::FrameStack;
pub use illumination::{plan_sweep, IlluminationMode, IlluminationSelection, IlluminationSet};
pub use roi::Roi;

use crate::error::{ReconstructError, Result};
use crate::optics::OpticalSystem;

/// Everything a solver needs from the outside world, already resident in
/// memory and cropped to the region of interest.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub frames: FrameStack,
    pub illumination: IlluminationSet,
    pub system: OpticalSystem,
}

impl Dataset {
    /// Bundle inputs after checking that they are mutually consistent.
    pub fn new(
        frames: FrameStack,
        illumination: IlluminationSet,
        system: OpticalSystem,
    ) -> Result<Self> {
        let dataset = Self {
            frames,
            illumination,
            system,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Check frame/illumination correspondence and system parameters.
    pub fn validate(&self) -> Result<()> {
        validate_inputs(&self.frames, &self.illumination, &self.system)
    }

    /// Crop every frame to `roi`, keeping illumination and system.
    pub fn crop(&self, roi: &Roi) -> Result<Self> {
        Ok(Self {
            frames: self.frames.crop(roi)?,
            illumination: self.illumination.clone(),
            system: self.system,
        })
    }
}

pub(crate) fn validate_inputs(
    frames: &FrameStack,
    illumination: &IlluminationSet,
    system: &OpticalSystem,
) -> Result<()> {
    system.validate()?;
    if illumination.is_empty() {
        return Err(ReconstructError::config("illumination set is empty"));
    }
    if frames.len() != illumination.len() {
        return Err(ReconstructError::config(format!(
            "frame count {} does not match illumination count {}",
            frames.len(),
            illumination.len()
        )));
    }
    let (rows, cols) = frames.dims();
    if rows % 2 != 0 || cols % 2 != 0 {
        return Err(ReconstructError::config(format!(
            "frame dimensions must be even, got {rows}x{cols}"
        )));
    }
    Ok(())
}
