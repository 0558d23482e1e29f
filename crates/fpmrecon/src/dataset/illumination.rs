use serde::{Deserialize, Serialize};

use crate::error::{ReconstructError, Result};
use crate::optics::OpticalSystem;

/// Illumination directions, one `[sx, sy]` pair per frame.
///
/// Components are direction sines (normalized transverse wavevector), so
/// `hypot(sx, sy)` is the illumination NA of that frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlluminationSet {
    directions: Vec<[f64; 2]>,
}

impl IlluminationSet {
    pub fn new(directions: Vec<[f64; 2]>) -> Result<Self> {
        if let Some(i) = directions
            .iter()
            .position(|d| !(d[0].is_finite() && d[1].is_finite()))
        {
            return Err(ReconstructError::config(format!(
                "illumination {i} has non-finite components"
            )));
        }
        Ok(Self { directions })
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn direction(&self, index: usize) -> [f64; 2] {
        self.directions[index]
    }

    pub fn directions(&self) -> &[[f64; 2]] {
        &self.directions
    }

    /// Illumination NA of frame `index`.
    pub fn na(&self, index: usize) -> f64 {
        let [sx, sy] = self.directions[index];
        sx.hypot(sy)
    }
}

/// Which part of the illumination set participates in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IlluminationMode {
    #[default]
    All,
    /// Illumination NA within the objective NA (plus tolerance).
    BrightField,
    /// Illumination NA beyond the objective NA (plus tolerance).
    DarkField,
}

/// Illumination subset selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IlluminationSelection {
    pub mode: IlluminationMode,
    /// Angular tolerance (in NA units) added to the objective NA when
    /// separating bright-field from dark-field frames.
    pub tolerance: f64,
}

impl Default for IlluminationSelection {
    fn default() -> Self {
        Self {
            mode: IlluminationMode::All,
            tolerance: 0.05,
        }
    }
}

impl IlluminationSelection {
    fn accepts(&self, na_illu: f64, na_objective: f64) -> bool {
        let edge = na_objective + self.tolerance;
        match self.mode {
            IlluminationMode::All => true,
            IlluminationMode::BrightField => na_illu <= edge,
            IlluminationMode::DarkField => na_illu > edge,
        }
    }
}

/// Frame indices in processing order: selected by `selection`, sorted by
/// ascending illumination NA. Ties keep input order.
pub fn plan_sweep(
    illumination: &IlluminationSet,
    system: &OpticalSystem,
    selection: &IlluminationSelection,
) -> Result<Vec<usize>> {
    let mut order: Vec<usize> = (0..illumination.len()).collect();
    order.sort_by(|&a, &b| illumination.na(a).total_cmp(&illumination.na(b)));
    order.retain(|&i| selection.accepts(illumination.na(i), system.numerical_aperture));
    if order.is_empty() {
        return Err(ReconstructError::config(format!(
            "illumination mode {:?} selects no frames",
            selection.mode
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> IlluminationSet {
        IlluminationSet::new(vec![
            [0.2, 0.0],
            [0.0, 0.0],
            [0.05, -0.05],
            [0.0, 0.1],
            [-0.1, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn sweep_is_sorted_by_na_with_stable_ties() {
        let order = plan_sweep(
            &set(),
            &OpticalSystem::default(),
            &IlluminationSelection::default(),
        )
        .unwrap();
        assert_eq!(order, vec![1, 2, 3, 4, 0]);
    }

    #[test]
    fn bright_and_dark_field_partition() {
        let sys = OpticalSystem::default();
        let bright = plan_sweep(
            &set(),
            &sys,
            &IlluminationSelection {
                mode: IlluminationMode::BrightField,
                tolerance: 0.05,
            },
        )
        .unwrap();
        let dark = plan_sweep(
            &set(),
            &sys,
            &IlluminationSelection {
                mode: IlluminationMode::DarkField,
                tolerance: 0.05,
            },
        )
        .unwrap();
        assert_eq!(bright, vec![1, 2, 3, 4]);
        assert_eq!(dark, vec![0]);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let ill = IlluminationSet::new(vec![[0.0, 0.0]]).unwrap();
        let res = plan_sweep(
            &ill,
            &OpticalSystem::default(),
            &IlluminationSelection {
                mode: IlluminationMode::DarkField,
                tolerance: 0.05,
            },
        );
        assert!(matches!(res, Err(ReconstructError::Configuration(_))));
    }
}
