use crate::coordinate::Coordinate;
use crate::error::LensResult;
use crate::ray_tracing;

/// Anything that bends light: a single mass profile, a galaxy, a whole plane.
pub trait DeflectionSource: Send + Sync {
    /// Deflection angle at `coordinate`, in arcseconds, reduced to the final source plane.
    fn deflection_at(&self, coordinate: Coordinate) -> Coordinate;
}

/// An ordered stack of lens planes that can be ray-traced.
///
/// Implementors only describe each plane in isolation; the multi-plane
/// recursion lives in [`ray_tracing::trace_to_plane`].
pub trait LensSystem: Sync {
    /// Number of planes, including the final (source) plane.
    fn plane_count(&self) -> usize;

    /// Deflection produced by plane `plane_index` alone at `coordinate`.
    /// `coordinate` is the ray position on that plane.
    fn plane_deflection(&self, coordinate: Coordinate, plane_index: usize) -> Coordinate;

    /// Distance ratio applied to plane `from_plane`'s deflection when tracing onto `to_plane`.
    fn scaling_factor(&self, from_plane: usize, to_plane: usize) -> f64;

    /// Maps an image-plane coordinate onto plane `target_plane_index`.
    fn trace(&self, coordinate: Coordinate, target_plane_index: usize) -> LensResult<Coordinate> {
        ray_tracing::trace_to_plane(self, coordinate, target_plane_index)
    }

    /// Total deflection accumulated from every plane below `plane_index`.
    fn deflection_at(&self, coordinate: Coordinate, plane_index: usize) -> LensResult<Coordinate> {
        Ok(coordinate - self.trace(coordinate, plane_index)?)
    }
}
