//! Point-source image positions.
//!
//! [`PositionsSolver`] ties the pieces together: [`RootLocator`] refines the
//! grid towards every root of the lens equation, [`SolutionMerger`] reduces
//! each cluster of accepted cells to one image and [`MagnificationEvaluator`]
//! attaches magnifications on request.

mod config;
mod locator;
mod magnification;
mod merger;

pub use config::{CandidateRule, SolverConfig};
pub use locator::{AcceptedCell, LevelStats, Located, RootLocator};
pub use magnification::MagnificationEvaluator;
pub use merger::SolutionMerger;

use serde::Serialize;

use crate::coordinate::Coordinate;
use crate::error::{LensError, LensResult};
use crate::grid::{CellIndex, Grid2D};
use crate::ray_tracing::check_plane_index;
use crate::traits::LensSystem;

/// One image of the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Solution {
    /// Newton-polished position inside or beside `cell`, or its centre.
    pub coordinate: Coordinate,
    /// `|trace(coordinate) - target|` when the cell was accepted.
    pub residual: f64,
    /// Cell on the finest refinement level.
    pub cell: CellIndex,
    pub magnification: Option<f64>,
}

impl From<AcceptedCell> for Solution {
    fn from(accepted: AcceptedCell) -> Self {
        Self {
            coordinate: accepted.coordinate,
            residual: accepted.residual,
            cell: accepted.cell,
            magnification: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    /// Sorted by `(y, x)`.
    pub solutions: Vec<Solution>,
    pub levels: Vec<LevelStats>,
    pub finest_pixel_scale: f64,
    /// Cells accepted before merging.
    pub accepted_cells: usize,
}

impl SolveReport {
    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.solutions.iter().map(|s| s.coordinate).collect()
    }

    pub fn total_traced(&self) -> usize {
        self.levels.iter().map(|l| l.cells_traced).sum()
    }
}

/// Finds the image-plane positions of a point source.
#[derive(Debug, Clone)]
pub struct PositionsSolver {
    grid: Grid2D,
    config: SolverConfig,
    locator: RootLocator,
    merger: SolutionMerger,
    refinement_depth: usize,
    finest_pixel_scale: f64,
}

impl PositionsSolver {
    /// Validates `config` against `grid` up front, so a solve never fails on settings.
    pub fn new(grid: Grid2D, config: SolverConfig) -> LensResult<Self> {
        config.validate()?;
        let level_zero = grid.sub_grid()?;
        let refinement_depth = config.refinement_depth_for(level_zero.pixel_scale())?;
        let finest_pixel_scale = (0..refinement_depth)
            .fold(level_zero.pixel_scale(), |scale, _| scale / config.upscale_factor as f64);
        let (rows, cols) = level_zero.shape_native();
        let finest_side = u32::try_from(refinement_depth)
            .ok()
            .and_then(|depth| config.upscale_factor.checked_pow(depth))
            .and_then(|scale| rows.max(cols).checked_mul(scale));
        if finest_side.is_none() {
            return Err(LensError::InvalidConfig(format!(
                "{refinement_depth} refinement levels by a factor of {} overflow the grid index range",
                config.upscale_factor
            )));
        }
        log::debug!(
            "positions solver: {:?} grid at {} arcsec/pixel, {refinement_depth} refinement levels down to {finest_pixel_scale:.3e}",
            grid.shape_native(),
            grid.pixel_scale()
        );
        Ok(Self {
            locator: RootLocator::new(config)?,
            merger: SolutionMerger::new(config.merge_radius_pixels),
            grid,
            config,
            refinement_depth,
            finest_pixel_scale,
        })
    }

    pub fn grid(&self) -> &Grid2D {
        &self.grid
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn refinement_depth(&self) -> usize {
        self.refinement_depth
    }

    /// Pixel scale of the deepest refinement level.
    pub fn finest_pixel_scale(&self) -> f64 {
        self.finest_pixel_scale
    }

    /// Deduplicated image positions of `source_plane_coordinate` on plane
    /// `upper_plane_index`, sorted by `(y, x)`. Empty when the source is singly
    /// imaged outside the grid or not imaged at all.
    pub fn solve<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        source_plane_coordinate: Coordinate,
        upper_plane_index: usize,
    ) -> LensResult<Vec<Coordinate>> {
        Ok(self
            .solve_with_report(lens, source_plane_coordinate, upper_plane_index)?
            .coordinates())
    }

    pub fn solve_with_report<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        source_plane_coordinate: Coordinate,
        upper_plane_index: usize,
    ) -> LensResult<SolveReport> {
        check_plane_index(lens, upper_plane_index)?;
        let located =
            self.locator
                .locate(lens, &self.grid, source_plane_coordinate, upper_plane_index)?;

        let clusters = self.merger.merge(&located.accepted);
        let representatives = self.merger.discard_stragglers(
            lens,
            &clusters,
            source_plane_coordinate,
            upper_plane_index,
            &self.evaluator(located.finest_pixel_scale)?,
            located.finest_pixel_scale,
        )?;

        let candidates_at_last_level = located.levels.last().map_or(0, |l| l.candidates);
        if representatives.is_empty() && candidates_at_last_level > 0 {
            log::warn!(
                "{candidates_at_last_level} candidate cells for {source_plane_coordinate} but none accepted at tolerance {}",
                self.config.distance_from_source_centre
            );
        }

        let report = SolveReport {
            solutions: representatives.into_iter().map(Solution::from).collect(),
            accepted_cells: located.accepted.len(),
            levels: located.levels,
            finest_pixel_scale: located.finest_pixel_scale,
        };
        log::info!(
            "found {} images of {source_plane_coordinate} on plane {upper_plane_index} ({} levels, {} rays traced)",
            report.solutions.len(),
            report.levels.len(),
            report.total_traced()
        );
        Ok(report)
    }

    /// Signed magnification at every position, index-aligned with `positions`.
    pub fn magnification_via_hessian<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        positions: &[Coordinate],
        plane_index: usize,
    ) -> LensResult<Vec<f64>> {
        self.evaluator(self.finest_pixel_scale)?
            .magnifications(lens, positions, plane_index)
    }

    /// [`Self::solve_with_report`] with each solution's magnification filled in.
    pub fn solve_with_magnifications<L: LensSystem + ?Sized>(
        &self,
        lens: &L,
        source_plane_coordinate: Coordinate,
        upper_plane_index: usize,
    ) -> LensResult<Vec<Solution>> {
        let report = self.solve_with_report(lens, source_plane_coordinate, upper_plane_index)?;
        let magnifications =
            self.magnification_via_hessian(lens, &report.coordinates(), upper_plane_index)?;
        Ok(report
            .solutions
            .into_iter()
            .zip(magnifications)
            .map(|(solution, magnification)| Solution {
                magnification: Some(magnification),
                ..solution
            })
            .collect())
    }

    fn evaluator(&self, pixel_scale: f64) -> LensResult<MagnificationEvaluator> {
        Ok(MagnificationEvaluator::new(
            self.config.hessian_step_fraction * pixel_scale,
            self.config.degenerate_tolerance,
        )?
        .with_parallel(self.config.parallel))
    }
}
