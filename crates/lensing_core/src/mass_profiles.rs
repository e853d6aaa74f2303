//! Analytic mass profiles.
//!
//! Each profile is a plain struct implementing [`DeflectionSource`]; the
//! [`MassProfile`] enum is the serialisable union used by [`crate::galaxy::Galaxy`].
//! Elliptical profiles measure `position_angle` in degrees, counter-clockwise
//! from the positive x axis. Deflections at an exact singular centre are zero.

use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::error::{LensError, LensResult};
use crate::traits::DeflectionSource;

const SINGULAR_RADIUS: f64 = 1e-12;

/// Offset from `centre` expressed in the profile's rotated frame as `x' + i y'`.
fn to_profile_frame(coordinate: Coordinate, centre: Coordinate, rotation: Complex<f64>) -> Complex<f64> {
    Complex::new(coordinate.x - centre.x, coordinate.y - centre.y) * rotation.conj()
}

fn from_profile_frame(deflection: Complex<f64>, rotation: Complex<f64>) -> Coordinate {
    let rotated = deflection * rotation;
    Coordinate::new(rotated.im, rotated.re)
}

fn rotation_for(position_angle_degrees: f64) -> Complex<f64> {
    Complex::from_polar(1.0, position_angle_degrees.to_radians())
}

fn require(condition: bool, message: impl FnOnce() -> String) -> LensResult<()> {
    if condition {
        Ok(())
    } else {
        Err(LensError::InvalidModel(message()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointMass {
    pub centre: Coordinate,
    pub einstein_radius: f64,
}

impl DeflectionSource for PointMass {
    fn deflection_at(&self, coordinate: Coordinate) -> Coordinate {
        let offset = coordinate - self.centre;
        let r2 = offset.y * offset.y + offset.x * offset.x;
        if r2 < SINGULAR_RADIUS * SINGULAR_RADIUS {
            return Coordinate::origin();
        }
        offset * (self.einstein_radius * self.einstein_radius / r2)
    }
}

/// Singular isothermal ellipsoid. Convergence is
/// `κ = θ_E / (2 sqrt(q x'² + y'²/q))`, so `axis_ratio = 1` is the singular isothermal sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Isothermal {
    pub centre: Coordinate,
    pub einstein_radius: f64,
    pub axis_ratio: f64,
    #[serde(default)]
    pub position_angle: f64,
}

impl Isothermal {
    pub fn sphere(centre: Coordinate, einstein_radius: f64) -> Self {
        Self {
            centre,
            einstein_radius,
            axis_ratio: 1.0,
            position_angle: 0.0,
        }
    }

    pub fn ellipse(
        centre: Coordinate,
        einstein_radius: f64,
        axis_ratio: f64,
        position_angle: f64,
    ) -> Self {
        Self {
            centre,
            einstein_radius,
            axis_ratio,
            position_angle,
        }
    }
}

impl DeflectionSource for Isothermal {
    fn deflection_at(&self, coordinate: Coordinate) -> Coordinate {
        let rotation = rotation_for(self.position_angle);
        let z = to_profile_frame(coordinate, self.centre, rotation);
        let q = self.axis_ratio;
        let psi = (q * q * z.re * z.re + z.im * z.im).sqrt();
        if psi < SINGULAR_RADIUS {
            return Coordinate::origin();
        }
        let b = self.einstein_radius * q.sqrt();
        let deflection = if (1.0 - q).abs() < 1e-8 {
            z * (b / psi)
        } else {
            let e = (1.0 - q * q).sqrt();
            Complex::new(
                b / e * (e * z.re / psi).atan(),
                b / e * (e * z.im / psi).atanh(),
            )
        };
        from_profile_frame(deflection, rotation)
    }
}

/// Spherical Navarro-Frenk-White halo with characteristic convergence `kappa_s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NfwSphere {
    pub centre: Coordinate,
    pub kappa_s: f64,
    pub scale_radius: f64,
}

impl NfwSphere {
    fn radial_deflection(&self, radius: f64) -> f64 {
        let x = radius / self.scale_radius;
        let h = if (x - 1.0).abs() < 1e-10 {
            (0.5f64).ln() + 1.0
        } else if x < 1.0 {
            (x / 2.0).ln() + 2.0 / (1.0 - x * x).sqrt() * ((1.0 - x) / (1.0 + x)).sqrt().atanh()
        } else {
            (x / 2.0).ln() + 2.0 / (x * x - 1.0).sqrt() * ((x - 1.0) / (x + 1.0)).sqrt().atan()
        };
        4.0 * self.kappa_s * self.scale_radius * h / x
    }
}

impl DeflectionSource for NfwSphere {
    fn deflection_at(&self, coordinate: Coordinate) -> Coordinate {
        let offset = coordinate - self.centre;
        let radius = offset.norm();
        if radius < SINGULAR_RADIUS {
            return Coordinate::origin();
        }
        offset * (self.radial_deflection(radius) / radius)
    }
}

/// Constant external shear, centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExternalShear {
    pub gamma_1: f64,
    pub gamma_2: f64,
}

impl DeflectionSource for ExternalShear {
    fn deflection_at(&self, coordinate: Coordinate) -> Coordinate {
        Coordinate::new(
            self.gamma_2 * coordinate.x - self.gamma_1 * coordinate.y,
            self.gamma_1 * coordinate.x + self.gamma_2 * coordinate.y,
        )
    }
}

/// Uniform convergence `kappa`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassSheet {
    pub centre: Coordinate,
    pub kappa: f64,
}

impl DeflectionSource for MassSheet {
    fn deflection_at(&self, coordinate: Coordinate) -> Coordinate {
        (coordinate - self.centre) * self.kappa
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MassProfile {
    PointMass(PointMass),
    Isothermal(Isothermal),
    NfwSphere(NfwSphere),
    ExternalShear(ExternalShear),
    MassSheet(MassSheet),
}

impl MassProfile {
    pub fn validate(&self) -> LensResult<()> {
        match self {
            MassProfile::PointMass(p) => {
                require(p.centre.is_finite(), || "point mass centre must be finite".into())?;
                require(p.einstein_radius.is_finite() && p.einstein_radius >= 0.0, || {
                    format!("point mass Einstein radius must be non-negative, got {}", p.einstein_radius)
                })
            }
            MassProfile::Isothermal(p) => {
                require(p.centre.is_finite(), || "isothermal centre must be finite".into())?;
                require(p.einstein_radius.is_finite() && p.einstein_radius >= 0.0, || {
                    format!("isothermal Einstein radius must be non-negative, got {}", p.einstein_radius)
                })?;
                require(p.axis_ratio > 0.0 && p.axis_ratio <= 1.0, || {
                    format!("isothermal axis ratio must lie in (0, 1], got {}", p.axis_ratio)
                })?;
                require(p.position_angle.is_finite(), || "position angle must be finite".into())
            }
            MassProfile::NfwSphere(p) => {
                require(p.centre.is_finite(), || "NFW centre must be finite".into())?;
                require(p.kappa_s.is_finite(), || "NFW kappa_s must be finite".into())?;
                require(p.scale_radius.is_finite() && p.scale_radius > 0.0, || {
                    format!("NFW scale radius must be positive, got {}", p.scale_radius)
                })
            }
            MassProfile::ExternalShear(p) => require(
                p.gamma_1.is_finite() && p.gamma_2.is_finite(),
                || "shear components must be finite".into(),
            ),
            MassProfile::MassSheet(p) => require(
                p.centre.is_finite() && p.kappa.is_finite(),
                || "mass sheet parameters must be finite".into(),
            ),
        }
    }
}

impl DeflectionSource for MassProfile {
    fn deflection_at(&self, coordinate: Coordinate) -> Coordinate {
        match self {
            MassProfile::PointMass(p) => p.deflection_at(coordinate),
            MassProfile::Isothermal(p) => p.deflection_at(coordinate),
            MassProfile::NfwSphere(p) => p.deflection_at(coordinate),
            MassProfile::ExternalShear(p) => p.deflection_at(coordinate),
            MassProfile::MassSheet(p) => p.deflection_at(coordinate),
        }
    }
}

impl From<PointMass> for MassProfile {
    fn from(value: PointMass) -> Self {
        MassProfile::PointMass(value)
    }
}

impl From<Isothermal> for MassProfile {
    fn from(value: Isothermal) -> Self {
        MassProfile::Isothermal(value)
    }
}

impl From<NfwSphere> for MassProfile {
    fn from(value: NfwSphere) -> Self {
        MassProfile::NfwSphere(value)
    }
}

impl From<ExternalShear> for MassProfile {
    fn from(value: ExternalShear) -> Self {
        MassProfile::ExternalShear(value)
    }
}

impl From<MassSheet> for MassProfile {
    fn from(value: MassSheet) -> Self {
        MassProfile::MassSheet(value)
    }
}
