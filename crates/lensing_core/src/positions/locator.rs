//! Grid-refinement search for image-plane roots of the lens equation.
//!
//! Each level traces the cells it was handed, keeps the ones whose residual
//! neighbourhood brackets zero, and hands their children to the next level.
//! The work list is explicit, so depth is bounded by the configuration rather
//! than the call stack.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::coordinate::Coordinate;
use crate::error::{LensError, LensResult};
use crate::grid::{CellIndex, Grid2D};
use crate::parallel::{map_ordered, try_map_ordered};
use crate::positions::config::{CandidateRule, SolverConfig};
use crate::positions::magnification::MagnificationEvaluator;
use crate::ray_tracing::{check_plane_index, trace_unchecked};
use crate::traits::LensSystem;

static NEIGHBOURHOOD: [(isize, isize); 9] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 0),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// What one refinement level did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelStats {
    pub level: usize,
    pub pixel_scale: f64,
    pub cells_examined: usize,
    pub cells_traced: usize,
    pub candidates: usize,
}

/// A finest-level cell whose residual passed the acceptance test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcceptedCell {
    pub cell: CellIndex,
    pub coordinate: Coordinate,
    pub residual: f64,
}

impl AcceptedCell {
    /// Smallest residual first; ties broken by position.
    pub(crate) fn cmp_by_residual(&self, other: &AcceptedCell) -> Ordering {
        self.residual
            .total_cmp(&other.residual)
            .then_with(|| self.coordinate.cmp_yx(&other.coordinate))
    }
}

#[derive(Debug, Clone)]
pub struct Located {
    /// Accepted cells in row-major order of the finest grid.
    pub accepted: Vec<AcceptedCell>,
    pub levels: Vec<LevelStats>,
    pub finest_pixel_scale: f64,
}

/// Residuals of a single refinement level, traced on demand.
struct ResidualCache<'g> {
    grid: &'g Grid2D,
    residuals: HashMap<CellIndex, Coordinate>,
}

impl<'g> ResidualCache<'g> {
    fn new(grid: &'g Grid2D) -> Self {
        Self {
            grid,
            residuals: HashMap::new(),
        }
    }

    fn fill<L: LensSystem + ?Sized>(
        &mut self,
        lens: &L,
        cells: &[CellIndex],
        target: Coordinate,
        plane_index: usize,
        parallel: bool,
    ) {
        let missing: Vec<CellIndex> = cells
            .iter()
            .filter(|cell| !self.residuals.contains_key(*cell))
            .copied()
            .collect();
        let grid = self.grid;
        let traced = map_ordered(&missing, parallel, |cell| {
            trace_unchecked(lens, grid.coordinate_at(*cell), plane_index) - target
        });
        self.residuals.extend(missing.into_iter().zip(traced));
    }

    fn get(&self, cell: CellIndex) -> Option<Coordinate> {
        self.residuals.get(&cell).copied()
    }

    fn len(&self) -> usize {
        self.residuals.len()
    }
}

#[derive(Debug, Clone)]
pub struct RootLocator {
    config: SolverConfig,
}

impl RootLocator {
    pub fn new(config: SolverConfig) -> LensResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Finds every finest-level cell of `grid` that holds a root of the lens
    /// equation for `target` on plane `plane_index`, to within
    /// `distance_from_source_centre` in the image plane.
    /// An empty result is not an error.
    pub fn locate<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        grid: &Grid2D,
        target: Coordinate,
        plane_index: usize,
    ) -> LensResult<Located> {
        check_plane_index(lens, plane_index)?;
        let mut level_grid = grid.sub_grid()?;
        let depth = self.config.refinement_depth_for(level_grid.pixel_scale())?;
        let factor = self.config.upscale_factor;

        let limit = self.config.max_cells_per_level;
        if level_grid.total_pixels() > limit {
            return Err(LensError::RefinementOverflow {
                level: 0,
                cells: level_grid.total_pixels(),
                limit,
            });
        }
        let (rows, cols) = level_grid.shape_native();
        let mut cells: Vec<CellIndex> = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| CellIndex::new(row, col)))
            .collect();

        let mut levels = Vec::with_capacity(depth + 1);
        let mut level = 0;
        loop {
            if cells.len() > limit {
                return Err(LensError::RefinementOverflow {
                    level,
                    cells: cells.len(),
                    limit,
                });
            }

            let mut cache = ResidualCache::new(&level_grid);
            let to_trace = self.cells_to_trace(&level_grid, &cells);
            cache.fill(lens, &to_trace, target, plane_index, self.config.parallel);

            let candidates: Vec<CellIndex> = cells
                .iter()
                .copied()
                .filter(|&cell| self.is_candidate(&cache, cell))
                .collect();

            let stats = LevelStats {
                level,
                pixel_scale: level_grid.pixel_scale(),
                cells_examined: cells.len(),
                cells_traced: cache.len(),
                candidates: candidates.len(),
            };
            log::debug!(
                "level {}: pixel scale {:.3e}, {} cells examined, {} traced, {} candidates",
                stats.level,
                stats.pixel_scale,
                stats.cells_examined,
                stats.cells_traced,
                stats.candidates
            );
            levels.push(stats);

            if level == depth || candidates.is_empty() {
                let accepted = self.accept(lens, &cache, &candidates, target, plane_index)?;
                return Ok(Located {
                    accepted,
                    levels,
                    finest_pixel_scale: level_grid.pixel_scale(),
                });
            }

            cells = refine(&candidates, factor);
            level_grid = level_grid.upscale(factor)?;
            level += 1;
        }
    }

    fn cells_to_trace(&self, grid: &Grid2D, cells: &[CellIndex]) -> Vec<CellIndex> {
        match self.config.candidate_rule {
            CandidateRule::ResidualThreshold { .. } => cells.to_vec(),
            CandidateRule::Bracketing => {
                let mut needed: Vec<CellIndex> = cells
                    .iter()
                    .flat_map(|&cell| {
                        NEIGHBOURHOOD
                            .iter()
                            .filter_map(move |&(dr, dc)| grid.offset_cell(cell, dr, dc))
                    })
                    .collect();
                needed.sort_unstable();
                needed.dedup();
                needed
            }
        }
    }

    fn is_candidate(&self, cache: &ResidualCache<'_>, cell: CellIndex) -> bool {
        match self.config.candidate_rule {
            CandidateRule::ResidualThreshold {
                pixel_scale_multiple,
            } => cache.get(cell).is_some_and(|residual| {
                residual.norm() <= pixel_scale_multiple * cache.grid.pixel_scale()
            }),
            CandidateRule::Bracketing => {
                let mut y_range = (f64::INFINITY, f64::NEG_INFINITY);
                let mut x_range = (f64::INFINITY, f64::NEG_INFINITY);
                for &(dr, dc) in &NEIGHBOURHOOD {
                    let Some(residual) = cache
                        .grid
                        .offset_cell(cell, dr, dc)
                        .and_then(|neighbour| cache.get(neighbour))
                    else {
                        continue;
                    };
                    y_range = (y_range.0.min(residual.y), y_range.1.max(residual.y));
                    x_range = (x_range.0.min(residual.x), x_range.1.max(residual.x));
                }
                brackets_zero(y_range) && brackets_zero(x_range)
            }
        }
    }

    /// Accepts a candidate when one Newton step from its centre moves at most
    /// `distance_from_source_centre` in the image plane and lands on a point that
    /// traces to within the same distance of `target`. That point becomes the
    /// cell's coordinate. Where the step is unavailable or misses, the centre
    /// is accepted on its own target-plane residual.
    fn accept<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        cache: &ResidualCache<'_>,
        candidates: &[CellIndex],
        target: Coordinate,
        plane_index: usize,
    ) -> LensResult<Vec<AcceptedCell>> {
        let grid = cache.grid;
        let tolerance = self.config.distance_from_source_centre;
        let evaluator = MagnificationEvaluator::new(
            self.config.hessian_step_fraction * grid.pixel_scale(),
            self.config.degenerate_tolerance,
        )?;

        let accepted = try_map_ordered(candidates, self.config.parallel, |&cell| -> LensResult<_> {
            let Some(residual) = cache.get(cell) else {
                return Ok(None);
            };
            let centre = grid.coordinate_at(cell);
            let polished = evaluator
                .newton_step(lens, centre, target, plane_index)?
                .filter(|step| step.norm() <= tolerance)
                .map(|step| {
                    let coordinate = centre - step;
                    let residual = trace_unchecked(lens, coordinate, plane_index).distance(&target);
                    AcceptedCell {
                        cell,
                        coordinate,
                        residual,
                    }
                })
                .filter(|polished| polished.residual <= tolerance);
            let unpolished = AcceptedCell {
                cell,
                coordinate: centre,
                residual: residual.norm(),
            };
            Ok(polished.or((unpolished.residual <= tolerance).then_some(unpolished)))
        })?;
        Ok(accepted.into_iter().flatten().collect())
    }
}

fn brackets_zero((low, high): (f64, f64)) -> bool {
    low <= 0.0 && high >= 0.0
}

/// Children of every candidate on the next level, row-major.
fn refine(candidates: &[CellIndex], factor: usize) -> Vec<CellIndex> {
    let mut children: Vec<CellIndex> = candidates
        .iter()
        .flat_map(|&cell| Grid2D::children(cell, factor))
        .collect();
    children.sort_unstable();
    children
}
