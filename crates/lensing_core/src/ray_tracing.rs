//! Multi-plane ray tracing.
//!
//! A ray leaving image-plane position `θ` reaches plane `j` at
//! `θ_j = θ - Σ_{i<j} β_ij α_i(θ_i)`, where `α_i` is plane `i`'s deflection
//! evaluated at the ray's position on that plane and `β_ij` is the distance
//! ratio reported by [`LensSystem::scaling_factor`]. With a single lens plane
//! and `β_01 = 1` this is the usual lens equation `β = θ - α(θ)`.

use crate::coordinate::Coordinate;
use crate::error::{LensError, LensResult};
use crate::grid::Grid2D;
use crate::parallel::map_ordered;
use crate::traits::LensSystem;

pub fn check_plane_index<L: LensSystem + ?Sized>(lens: &L, plane_index: usize) -> LensResult<()> {
    let plane_count = lens.plane_count();
    if plane_index >= plane_count {
        return Err(LensError::InvalidPlaneIndex {
            index: plane_index,
            plane_count,
        });
    }
    Ok(())
}

/// Traces `coordinate` onto plane `target_plane_index`.
pub fn trace_to_plane<L: LensSystem + ?Sized>(
    lens: &L,
    coordinate: Coordinate,
    target_plane_index: usize,
) -> LensResult<Coordinate> {
    check_plane_index(lens, target_plane_index)?;
    Ok(trace_unchecked(lens, coordinate, target_plane_index))
}

/// Positions of the ray on every plane `0..=target_plane_index`.
pub fn traced_positions<L: LensSystem + ?Sized>(
    lens: &L,
    coordinate: Coordinate,
    target_plane_index: usize,
) -> LensResult<Vec<Coordinate>> {
    check_plane_index(lens, target_plane_index)?;
    let mut positions = Vec::with_capacity(target_plane_index + 1);
    positions.push(coordinate);
    let mut deflections: Vec<Coordinate> = Vec::with_capacity(target_plane_index);
    for plane in 1..=target_plane_index {
        let lower = plane - 1;
        deflections.push(lens.plane_deflection(positions[lower], lower));
        positions.push(accumulate(lens, coordinate, &deflections, plane));
    }
    Ok(positions)
}

/// Traces every pixel centre of `grid`, in row-major order.
pub fn trace_grid<L: LensSystem + ?Sized>(
    lens: &L,
    grid: &Grid2D,
    target_plane_index: usize,
    parallel: bool,
) -> LensResult<Vec<Coordinate>> {
    check_plane_index(lens, target_plane_index)?;
    let coordinates: Vec<Coordinate> = grid.coordinates().collect();
    Ok(map_ordered(&coordinates, parallel, |c| {
        trace_unchecked(lens, *c, target_plane_index)
    }))
}

/// Hot-path trace; callers have already validated the plane index.
pub(crate) fn trace_unchecked<L: LensSystem + ?Sized>(
    lens: &L,
    coordinate: Coordinate,
    target_plane_index: usize,
) -> Coordinate {
    if target_plane_index == 0 {
        return coordinate;
    }
    let mut position = coordinate;
    let mut deflections: Vec<Coordinate> = Vec::with_capacity(target_plane_index);
    for plane in 1..=target_plane_index {
        deflections.push(lens.plane_deflection(position, plane - 1));
        position = accumulate(lens, coordinate, &deflections, plane);
    }
    position
}

fn accumulate<L: LensSystem + ?Sized>(
    lens: &L,
    coordinate: Coordinate,
    deflections: &[Coordinate],
    plane: usize,
) -> Coordinate {
    let mut position = coordinate;
    for (lower, deflection) in deflections.iter().enumerate() {
        position -= *deflection * lens.scaling_factor(lower, plane);
    }
    position
}
