use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::error::{LensError, LensResult};
use crate::mass_profiles::MassProfile;
use crate::traits::DeflectionSource;

/// A collection of mass profiles at one redshift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Galaxy {
    pub redshift: f64,
    #[serde(default)]
    pub mass_profiles: Vec<MassProfile>,
}

impl Galaxy {
    /// A galaxy with no mass, e.g. a source galaxy that only marks a plane.
    pub fn new(redshift: f64) -> Self {
        Self {
            redshift,
            mass_profiles: Vec::new(),
        }
    }

    pub fn with_profile(mut self, profile: impl Into<MassProfile>) -> Self {
        self.mass_profiles.push(profile.into());
        self
    }

    pub fn validate(&self) -> LensResult<()> {
        if !(self.redshift.is_finite() && self.redshift > 0.0) {
            return Err(LensError::InvalidModel(format!(
                "galaxy redshift must be positive and finite, got {}",
                self.redshift
            )));
        }
        for profile in &self.mass_profiles {
            profile.validate()?;
        }
        Ok(())
    }

    pub fn has_mass(&self) -> bool {
        !self.mass_profiles.is_empty()
    }
}

impl DeflectionSource for Galaxy {
    fn deflection_at(&self, coordinate: Coordinate) -> Coordinate {
        self.mass_profiles
            .iter()
            .fold(Coordinate::origin(), |total, profile| {
                total + profile.deflection_at(coordinate)
            })
    }
}

/// Every galaxy sharing one redshift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub redshift: f64,
    pub galaxies: Vec<Galaxy>,
}

impl Plane {
    pub fn new(redshift: f64, galaxies: Vec<Galaxy>) -> Self {
        Self { redshift, galaxies }
    }

    pub fn has_mass(&self) -> bool {
        self.galaxies.iter().any(Galaxy::has_mass)
    }
}

impl DeflectionSource for Plane {
    fn deflection_at(&self, coordinate: Coordinate) -> Coordinate {
        self.galaxies
            .iter()
            .fold(Coordinate::origin(), |total, galaxy| {
                total + galaxy.deflection_at(coordinate)
            })
    }
}
