use serde::{Deserialize, Serialize};

use crate::error::{LensError, LensResult};

/// How a cell is judged worth refining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateRule {
    /// Both residual components change sign (or vanish) over the cell and its
    /// eight neighbours.
    #[default]
    Bracketing,
    /// `|residual| <= pixel_scale_multiple * level_pixel_scale`.
    ResidualThreshold { pixel_scale_multiple: f64 },
}

/// Settings for [`crate::positions::PositionsSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub use_upscaling: bool,
    pub upscale_factor: usize,
    /// Refinement stops once the level pixel scale is at or below this.
    pub pixel_scale_precision: f64,
    /// Largest image-plane distance between an accepted cell and its root, and
    /// largest target-plane residual of the accepted point.
    pub distance_from_source_centre: f64,
    pub candidate_rule: CandidateRule,
    pub max_refinement_depth: usize,
    pub max_cells_per_level: usize,
    pub parallel: bool,
    /// Finite-difference step as a fraction of the finest pixel scale.
    pub hessian_step_fraction: f64,
    pub degenerate_tolerance: f64,
    /// Linearised roots closer than this many finest pixels are one image.
    pub merge_radius_pixels: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            use_upscaling: true,
            upscale_factor: 2,
            pixel_scale_precision: 0.001,
            distance_from_source_centre: 0.001,
            candidate_rule: CandidateRule::Bracketing,
            max_refinement_depth: 32,
            max_cells_per_level: 4_000_000,
            parallel: true,
            hessian_step_fraction: 0.5,
            degenerate_tolerance: 1e-9,
            merge_radius_pixels: 2.0,
        }
    }
}

fn invalid(message: String) -> LensError {
    LensError::InvalidConfig(message)
}

impl SolverConfig {
    pub fn validate(&self) -> LensResult<()> {
        if self.upscale_factor < 2 {
            return Err(invalid(format!(
                "upscale_factor must be at least 2, got {}",
                self.upscale_factor
            )));
        }
        if !(self.pixel_scale_precision.is_finite() && self.pixel_scale_precision > 0.0) {
            return Err(invalid(format!(
                "pixel_scale_precision must be positive, got {}",
                self.pixel_scale_precision
            )));
        }
        if !(self.distance_from_source_centre.is_finite() && self.distance_from_source_centre >= 0.0)
        {
            return Err(invalid(format!(
                "distance_from_source_centre must be non-negative, got {}",
                self.distance_from_source_centre
            )));
        }
        if self.max_cells_per_level == 0 {
            return Err(invalid("max_cells_per_level must be positive".into()));
        }
        if !(self.hessian_step_fraction.is_finite() && self.hessian_step_fraction > 0.0) {
            return Err(invalid(format!(
                "hessian_step_fraction must be positive, got {}",
                self.hessian_step_fraction
            )));
        }
        if !(self.degenerate_tolerance.is_finite() && self.degenerate_tolerance >= 0.0) {
            return Err(invalid(format!(
                "degenerate_tolerance must be non-negative, got {}",
                self.degenerate_tolerance
            )));
        }
        if !(self.merge_radius_pixels.is_finite() && self.merge_radius_pixels >= 0.0) {
            return Err(invalid(format!(
                "merge_radius_pixels must be non-negative, got {}",
                self.merge_radius_pixels
            )));
        }
        if let CandidateRule::ResidualThreshold {
            pixel_scale_multiple,
        } = self.candidate_rule
        {
            if !(pixel_scale_multiple.is_finite() && pixel_scale_multiple > 0.0) {
                return Err(invalid(format!(
                    "pixel_scale_multiple must be positive, got {pixel_scale_multiple}"
                )));
            }
        }
        Ok(())
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> LensResult<Self> {
        let config: SolverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of upscaling steps needed to take `pixel_scale` to the precision.
    pub fn refinement_depth_for(&self, pixel_scale: f64) -> LensResult<usize> {
        if !self.use_upscaling {
            return Ok(0);
        }
        let mut depth = 0;
        let mut scale = pixel_scale;
        while scale > self.pixel_scale_precision {
            if depth == self.max_refinement_depth {
                return Err(invalid(format!(
                    "reaching pixel scale {} from {} needs more than {} refinement levels",
                    self.pixel_scale_precision, pixel_scale, self.max_refinement_depth
                )));
            }
            scale /= self.upscale_factor as f64;
            depth += 1;
        }
        Ok(depth)
    }
}
