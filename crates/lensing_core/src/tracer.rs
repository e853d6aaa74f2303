use nalgebra::DMatrix;

use crate::coordinate::Coordinate;
use crate::cosmology::Cosmology;
use crate::error::{LensError, LensResult};
use crate::galaxy::{Galaxy, Plane};
use crate::traits::{DeflectionSource, LensSystem};

/// Redshifts closer than this are treated as the same plane.
const REDSHIFT_TOLERANCE: f64 = 1e-9;

/// Planes sorted by redshift plus the precomputed `β_ij` matrix.
///
/// The last plane is the one every deflection is normalised to, so a system
/// with a single lens and a source needs a (possibly massless) galaxy at the
/// source redshift.
#[derive(Debug, Clone)]
pub struct Tracer {
    planes: Vec<Plane>,
    scaling_factors: DMatrix<f64>,
}

impl Tracer {
    /// Groups `galaxies` into planes by redshift, nearest first.
    pub fn from_galaxies<C: Cosmology + ?Sized>(
        mut galaxies: Vec<Galaxy>,
        cosmology: &C,
    ) -> LensResult<Self> {
        if galaxies.is_empty() {
            return Err(LensError::InvalidModel(
                "a tracer needs at least one galaxy".into(),
            ));
        }
        for galaxy in &galaxies {
            galaxy.validate()?;
        }
        galaxies.sort_by(|a, b| a.redshift.total_cmp(&b.redshift));

        let mut planes: Vec<Plane> = Vec::new();
        for galaxy in galaxies {
            match planes.last_mut() {
                Some(plane) if (galaxy.redshift - plane.redshift).abs() <= REDSHIFT_TOLERANCE => {
                    plane.galaxies.push(galaxy);
                }
                _ => planes.push(Plane::new(galaxy.redshift, vec![galaxy])),
            }
        }
        Self::from_planes(planes, cosmology)
    }

    /// Builds a tracer from planes that are already sorted by strictly increasing redshift.
    pub fn from_planes<C: Cosmology + ?Sized>(planes: Vec<Plane>, cosmology: &C) -> LensResult<Self> {
        if planes.is_empty() {
            return Err(LensError::InvalidModel(
                "a tracer needs at least one plane".into(),
            ));
        }
        for plane in &planes {
            if !(plane.redshift.is_finite() && plane.redshift > 0.0) {
                return Err(LensError::InvalidModel(format!(
                    "plane redshift must be positive and finite, got {}",
                    plane.redshift
                )));
            }
            for galaxy in &plane.galaxies {
                for profile in &galaxy.mass_profiles {
                    profile.validate()?;
                }
            }
        }
        if let Some(pair) = planes
            .windows(2)
            .find(|pair| pair[1].redshift - pair[0].redshift <= REDSHIFT_TOLERANCE)
        {
            return Err(LensError::InvalidModel(format!(
                "planes must have strictly increasing redshifts, got {} then {}",
                pair[0].redshift, pair[1].redshift
            )));
        }

        let n = planes.len();
        let z_final = planes[n - 1].redshift;
        let scaling_factors = DMatrix::from_fn(n, n, |i, j| {
            if i < j {
                cosmology.scaling_factor(planes[i].redshift, planes[j].redshift, z_final)
            } else {
                0.0
            }
        });
        log::debug!(
            "built tracer with {n} planes at redshifts {:?}",
            planes.iter().map(|p| p.redshift).collect::<Vec<_>>()
        );
        Ok(Self {
            planes,
            scaling_factors,
        })
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn redshifts(&self) -> Vec<f64> {
        self.planes.iter().map(|p| p.redshift).collect()
    }

    pub fn plane_index_of_redshift(&self, redshift: f64) -> Option<usize> {
        self.planes
            .iter()
            .position(|p| (p.redshift - redshift).abs() <= REDSHIFT_TOLERANCE)
    }
}

impl LensSystem for Tracer {
    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn plane_deflection(&self, coordinate: Coordinate, plane_index: usize) -> Coordinate {
        self.planes
            .get(plane_index)
            .map_or(Coordinate::origin(), |plane| plane.deflection_at(coordinate))
    }

    fn scaling_factor(&self, from_plane: usize, to_plane: usize) -> f64 {
        self.scaling_factors
            .get((from_plane, to_plane))
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmology::FlatLambdaCdm;
    use crate::mass_profiles::Isothermal;

    fn sis(einstein_radius: f64, redshift: f64) -> Galaxy {
        Galaxy::new(redshift).with_profile(Isothermal::sphere(Coordinate::origin(), einstein_radius))
    }

    #[test]
    fn galaxies_are_grouped_and_sorted_by_redshift() {
        let cosmology = FlatLambdaCdm::planck15();
        let tracer = Tracer::from_galaxies(
            vec![Galaxy::new(2.0), sis(1.0, 0.5), sis(0.3, 1.0), sis(0.2, 0.5)],
            &cosmology,
        )
        .expect("tracer should build");
        assert_eq!(tracer.redshifts(), vec![0.5, 1.0, 2.0]);
        assert_eq!(tracer.planes()[0].galaxies.len(), 2);
        assert_eq!(tracer.plane_index_of_redshift(1.0), Some(1));
        assert_eq!(tracer.plane_index_of_redshift(3.0), None);
    }

    #[test]
    fn scaling_factors_follow_the_cosmology() {
        let cosmology = FlatLambdaCdm::planck15();
        let tracer = Tracer::from_galaxies(
            vec![sis(1.0, 0.5), sis(0.3, 1.0), Galaxy::new(2.0)],
            &cosmology,
        )
        .expect("tracer should build");
        assert!((tracer.scaling_factor(0, 2) - 1.0).abs() < 1e-12);
        assert!((tracer.scaling_factor(1, 2) - 1.0).abs() < 1e-12);
        assert!((tracer.scaling_factor(0, 1) - 0.674).abs() < 0.01);
        assert_eq!(tracer.scaling_factor(1, 0), 0.0);
        assert_eq!(tracer.scaling_factor(7, 9), 0.0);
    }

    #[test]
    fn single_lens_traces_with_the_lens_equation() {
        let cosmology = FlatLambdaCdm::planck15();
        let tracer = Tracer::from_galaxies(vec![sis(1.6, 0.5), Galaxy::new(1.0)], &cosmology)
            .expect("tracer should build");
        let traced = tracer.trace(Coordinate::new(0.0, 2.0), 1).expect("trace");
        assert!((traced.x - 0.4).abs() < 1e-12);
        assert!(traced.y.abs() < 1e-12);
    }

    #[test]
    fn invalid_models_are_rejected() {
        let cosmology = FlatLambdaCdm::planck15();
        assert!(Tracer::from_galaxies(Vec::new(), &cosmology).is_err());
        assert!(Tracer::from_galaxies(vec![Galaxy::new(-0.5)], &cosmology).is_err());
        let unsorted = vec![
            Plane::new(1.0, vec![Galaxy::new(1.0)]),
            Plane::new(0.5, vec![Galaxy::new(0.5)]),
        ];
        assert!(matches!(
            Tracer::from_planes(unsorted, &cosmology),
            Err(LensError::InvalidModel(_))
        ));
    }
}
