//! Distances for turning per-plane deflections into multi-plane scaling factors.

use serde::{Deserialize, Serialize};

use crate::error::{LensError, LensResult};

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT: f64 = 299_792.458;

const INTEGRATION_STEPS: usize = 2048;

pub trait Cosmology: Send + Sync {
    /// Line-of-sight comoving distance to redshift `z`, in Mpc.
    fn comoving_distance(&self, z: f64) -> f64;

    fn angular_diameter_distance(&self, z: f64) -> f64 {
        self.comoving_distance(z) / (1.0 + z)
    }

    /// Angular diameter distance from `z1` to `z2 > z1`. Only valid for a flat universe.
    fn angular_diameter_distance_between(&self, z1: f64, z2: f64) -> f64 {
        (self.comoving_distance(z2) - self.comoving_distance(z1)) / (1.0 + z2)
    }

    /// `β_ij = D_ij D_s / (D_j D_is)`: how much of plane `i`'s deflection
    /// (normalised to the final plane) reaches plane `j`.
    fn scaling_factor(&self, z_i: f64, z_j: f64, z_final: f64) -> f64 {
        let d_ij = self.angular_diameter_distance_between(z_i, z_j);
        let d_j = self.angular_diameter_distance(z_j);
        let d_s = self.angular_diameter_distance(z_final);
        let d_is = self.angular_diameter_distance_between(z_i, z_final);
        if d_j == 0.0 || d_is == 0.0 {
            return 0.0;
        }
        d_ij * d_s / (d_j * d_is)
    }
}

/// Flat ΛCDM, radiation neglected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatLambdaCdm {
    /// H0 in km/s/Mpc.
    pub hubble_constant: f64,
    pub omega_matter: f64,
}

impl FlatLambdaCdm {
    pub fn new(hubble_constant: f64, omega_matter: f64) -> LensResult<Self> {
        if !(hubble_constant.is_finite() && hubble_constant > 0.0) {
            return Err(LensError::InvalidModel(format!(
                "Hubble constant must be positive, got {hubble_constant}"
            )));
        }
        if !(0.0..=1.0).contains(&omega_matter) {
            return Err(LensError::InvalidModel(format!(
                "omega_matter must lie in [0, 1], got {omega_matter}"
            )));
        }
        Ok(Self {
            hubble_constant,
            omega_matter,
        })
    }

    /// Planck 2015 parameters.
    pub fn planck15() -> Self {
        Self {
            hubble_constant: 67.74,
            omega_matter: 0.3075,
        }
    }

    pub fn hubble_distance(&self) -> f64 {
        SPEED_OF_LIGHT / self.hubble_constant
    }

    fn inverse_efunc(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        1.0 / (self.omega_matter * zp1 * zp1 * zp1 + (1.0 - self.omega_matter)).sqrt()
    }
}

impl Default for FlatLambdaCdm {
    fn default() -> Self {
        Self::planck15()
    }
}

impl Cosmology for FlatLambdaCdm {
    fn comoving_distance(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        // Composite Simpson's rule over [0, z].
        let n = INTEGRATION_STEPS;
        let h = z / n as f64;
        let mut sum = self.inverse_efunc(0.0) + self.inverse_efunc(z);
        for k in 1..n {
            let weight = if k % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight * self.inverse_efunc(k as f64 * h);
        }
        self.hubble_distance() * sum * h / 3.0
    }
}
