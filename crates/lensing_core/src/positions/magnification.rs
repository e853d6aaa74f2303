//! Point-source magnification from the finite-difference lensing Jacobian.

use nalgebra::Matrix2;

use crate::coordinate::Coordinate;
use crate::error::{LensError, LensResult};
use crate::parallel::try_map_ordered;
use crate::ray_tracing::check_plane_index;
use crate::traits::LensSystem;

/// Evaluates `μ = 1 / det(I - J)` with `J = ∂α/∂θ` from centred differences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnificationEvaluator {
    step: f64,
    degenerate_tolerance: f64,
    parallel: bool,
}

impl MagnificationEvaluator {
    /// `step` is the finite-difference half-width in arcseconds.
    pub fn new(step: f64, degenerate_tolerance: f64) -> LensResult<Self> {
        if !(step.is_finite() && step > 0.0) {
            return Err(LensError::InvalidConfig(format!(
                "finite-difference step must be positive, got {step}"
            )));
        }
        if !(degenerate_tolerance.is_finite() && degenerate_tolerance >= 0.0) {
            return Err(LensError::InvalidConfig(format!(
                "degenerate tolerance must be non-negative, got {degenerate_tolerance}"
            )));
        }
        Ok(Self {
            step,
            degenerate_tolerance,
            parallel: false,
        })
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// `J` in `[y, x]` order: row 0 holds `∂α_y/∂y, ∂α_y/∂x`.
    pub fn lensing_jacobian<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        coordinate: Coordinate,
        plane_index: usize,
    ) -> LensResult<Matrix2<f64>> {
        check_plane_index(lens, plane_index)?;
        let h = self.step;
        let dy = Coordinate::new(h, 0.0);
        let dx = Coordinate::new(0.0, h);
        let by_y = (lens.deflection_at(coordinate + dy, plane_index)?
            - lens.deflection_at(coordinate - dy, plane_index)?)
            * (0.5 / h);
        let by_x = (lens.deflection_at(coordinate + dx, plane_index)?
            - lens.deflection_at(coordinate - dx, plane_index)?)
            * (0.5 / h);
        Ok(Matrix2::new(by_y.y, by_x.y, by_y.x, by_x.x))
    }

    /// `A = I - J`, the Jacobian of the lens mapping itself.
    pub fn mapping_jacobian<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        coordinate: Coordinate,
        plane_index: usize,
    ) -> LensResult<Matrix2<f64>> {
        Ok(Matrix2::identity() - self.lensing_jacobian(lens, coordinate, plane_index)?)
    }

    /// `A⁻¹ r` at `coordinate`, where `r` is the residual from `target`: the
    /// image-plane offset from `coordinate` to the root of the linearised lens
    /// equation. `None` when `A` is singular or the offset is not finite.
    pub fn newton_step<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        coordinate: Coordinate,
        target: Coordinate,
        plane_index: usize,
    ) -> LensResult<Option<Coordinate>> {
        let residual = lens.trace(coordinate, plane_index)? - target;
        let a = self.mapping_jacobian(lens, coordinate, plane_index)?;
        Ok(a
            .try_inverse()
            .map(|inverse| Coordinate::from_vector(&(inverse * residual.to_vector())))
            .filter(Coordinate::is_finite))
    }

    /// Signed magnification; negative values mark odd-parity images.
    pub fn magnification<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        coordinate: Coordinate,
        plane_index: usize,
    ) -> LensResult<f64> {
        let a = self.mapping_jacobian(lens, coordinate, plane_index)?;
        let determinant = a.determinant();
        let scale = (a[(0, 0)] * a[(1, 1)]).abs() + (a[(0, 1)] * a[(1, 0)]).abs();
        if !determinant.is_finite()
            || determinant.abs() <= self.degenerate_tolerance * scale.max(1.0)
        {
            log::warn!(
                "degenerate magnification at {coordinate} on plane {plane_index}: det(A) = {determinant:e}"
            );
            return Err(LensError::DegenerateMagnification {
                coordinate,
                plane_index,
                determinant,
            });
        }
        Ok(1.0 / determinant)
    }

    /// One magnification per position, index-aligned with `positions`.
    pub fn magnifications<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        positions: &[Coordinate],
        plane_index: usize,
    ) -> LensResult<Vec<f64>> {
        check_plane_index(lens, plane_index)?;
        try_map_ordered(positions, self.parallel, |&position| {
            self.magnification(lens, position, plane_index)
        })
    }
}
