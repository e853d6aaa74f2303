//! Uniform image-plane grids.
//!
//! Pixels are square. Row 0 is the top of the grid (largest `y`) and column 0
//! its left edge (smallest `x`), so pixel centres are produced top-left first.
//! Upscaling subdivides every pixel into `factor²` children without moving the
//! outer edges of the grid.

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::error::{LensError, LensResult};

/// Row/column address of a pixel. Orders row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: usize,
    pub col: usize,
}

impl CellIndex {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub y_min: f64,
    pub y_max: f64,
    pub x_min: f64,
    pub x_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridSpec")]
pub struct Grid2D {
    shape: (usize, usize),
    pixel_scale: f64,
    origin: Coordinate,
    sub_size: usize,
}

#[derive(Deserialize)]
struct GridSpec {
    shape: (usize, usize),
    pixel_scale: f64,
    #[serde(default)]
    origin: Coordinate,
    #[serde(default = "default_sub_size")]
    sub_size: usize,
}

fn default_sub_size() -> usize {
    1
}

impl TryFrom<GridSpec> for Grid2D {
    type Error = LensError;

    fn try_from(spec: GridSpec) -> LensResult<Self> {
        Grid2D::new(spec.shape, spec.pixel_scale, spec.origin, spec.sub_size)
    }
}

impl Grid2D {
    pub fn new(
        shape: (usize, usize),
        pixel_scale: f64,
        origin: Coordinate,
        sub_size: usize,
    ) -> LensResult<Self> {
        if shape.0 == 0 || shape.1 == 0 {
            return Err(LensError::InvalidGrid(format!(
                "shape must be non-empty, got {:?}",
                shape
            )));
        }
        if !pixel_scale.is_finite() || pixel_scale <= 0.0 {
            return Err(LensError::InvalidGrid(format!(
                "pixel scale must be finite and positive, got {pixel_scale}"
            )));
        }
        if !origin.is_finite() {
            return Err(LensError::InvalidGrid(format!(
                "origin must be finite, got {origin}"
            )));
        }
        if sub_size == 0 {
            return Err(LensError::InvalidGrid("sub size must be at least 1".into()));
        }
        Ok(Self {
            shape,
            pixel_scale,
            origin,
            sub_size,
        })
    }

    /// A grid centred on the origin with no sub-sampling.
    pub fn uniform(shape: (usize, usize), pixel_scale: f64) -> LensResult<Self> {
        Self::new(shape, pixel_scale, Coordinate::origin(), 1)
    }

    pub fn with_sub_size(self, sub_size: usize) -> LensResult<Self> {
        Self::new(self.shape, self.pixel_scale, self.origin, sub_size)
    }

    pub fn shape_native(&self) -> (usize, usize) {
        self.shape
    }

    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    pub fn sub_size(&self) -> usize {
        self.sub_size
    }

    pub fn total_pixels(&self) -> usize {
        self.shape.0 * self.shape.1
    }

    pub fn contains_cell(&self, cell: CellIndex) -> bool {
        cell.row < self.shape.0 && cell.col < self.shape.1
    }

    /// Centre of pixel `cell`. Defined for any index, in or out of range.
    pub fn coordinate_at(&self, cell: CellIndex) -> Coordinate {
        let (rows, cols) = self.shape;
        let y = self.origin.y - (cell.row as f64 - (rows as f64 - 1.0) / 2.0) * self.pixel_scale;
        let x = self.origin.x + (cell.col as f64 - (cols as f64 - 1.0) / 2.0) * self.pixel_scale;
        Coordinate::new(y, x)
    }

    /// The pixel whose footprint contains `coordinate`, if any.
    pub fn cell_containing(&self, coordinate: Coordinate) -> Option<CellIndex> {
        if !coordinate.is_finite() {
            return None;
        }
        let (rows, cols) = self.shape;
        let row = ((self.origin.y - coordinate.y) / self.pixel_scale + rows as f64 / 2.0).floor();
        let col = ((coordinate.x - self.origin.x) / self.pixel_scale + cols as f64 / 2.0).floor();
        if row < 0.0 || col < 0.0 || row >= rows as f64 || col >= cols as f64 {
            return None;
        }
        Some(CellIndex::new(row as usize, col as usize))
    }

    /// The in-range neighbour of `cell` at offset `(d_row, d_col)`.
    pub fn offset_cell(&self, cell: CellIndex, d_row: isize, d_col: isize) -> Option<CellIndex> {
        let row = cell.row.checked_add_signed(d_row)?;
        let col = cell.col.checked_add_signed(d_col)?;
        let shifted = CellIndex::new(row, col);
        self.contains_cell(shifted).then_some(shifted)
    }

    /// Corners of pixel `cell`: top-left, top-right, bottom-right, bottom-left.
    pub fn cell_corners(&self, cell: CellIndex) -> [Coordinate; 4] {
        let centre = self.coordinate_at(cell);
        let half = self.pixel_scale / 2.0;
        [
            Coordinate::new(centre.y + half, centre.x - half),
            Coordinate::new(centre.y + half, centre.x + half),
            Coordinate::new(centre.y - half, centre.x + half),
            Coordinate::new(centre.y - half, centre.x - half),
        ]
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let half_height = self.shape.0 as f64 * self.pixel_scale / 2.0;
        let half_width = self.shape.1 as f64 * self.pixel_scale / 2.0;
        BoundingBox {
            y_min: self.origin.y - half_height,
            y_max: self.origin.y + half_height,
            x_min: self.origin.x - half_width,
            x_max: self.origin.x + half_width,
        }
    }

    /// Pixel centres in row-major order.
    pub fn coordinates(&self) -> Coordinates<'_> {
        Coordinates {
            grid: self,
            next: 0,
        }
    }

    /// Sub-pixel centres, pixel by pixel in row-major order, each pixel's
    /// `sub_size²` samples also row-major.
    pub fn sub_coordinates(&self) -> impl Iterator<Item = Coordinate> + '_ {
        let sub = self.sub_size;
        let sub_scale = self.pixel_scale / sub as f64;
        self.coordinates().flat_map(move |centre| {
            let top = centre.y + self.pixel_scale / 2.0;
            let left = centre.x - self.pixel_scale / 2.0;
            (0..sub * sub).map(move |k| {
                let (i, j) = (k / sub, k % sub);
                Coordinate::new(
                    top - (i as f64 + 0.5) * sub_scale,
                    left + (j as f64 + 0.5) * sub_scale,
                )
            })
        })
    }

    /// Splits every pixel into `factor × factor` children over the same footprint.
    pub fn upscale(&self, factor: usize) -> LensResult<Grid2D> {
        if factor == 0 {
            return Err(LensError::InvalidGrid(
                "upscale factor must be at least 1".into(),
            ));
        }
        let rows = self.shape.0.checked_mul(factor);
        let cols = self.shape.1.checked_mul(factor);
        match (rows, cols) {
            (Some(rows), Some(cols)) => Grid2D::new(
                (rows, cols),
                self.pixel_scale / factor as f64,
                self.origin,
                self.sub_size,
            ),
            _ => Err(LensError::InvalidGrid(format!(
                "upscaling shape {:?} by {factor} overflows",
                self.shape
            ))),
        }
    }

    /// The native grid resampled at its sub-pixel resolution.
    pub fn sub_grid(&self) -> LensResult<Grid2D> {
        self.upscale(self.sub_size)?.with_sub_size(1)
    }

    /// Indices, on `self.upscale(factor)`, of the `factor²` children of `cell`.
    pub fn children(cell: CellIndex, factor: usize) -> impl Iterator<Item = CellIndex> {
        (0..factor * factor)
            .map(move |k| CellIndex::new(cell.row * factor + k / factor, cell.col * factor + k % factor))
    }
}

/// Row-major iterator over a grid's pixel centres.
#[derive(Debug, Clone)]
pub struct Coordinates<'a> {
    grid: &'a Grid2D,
    next: usize,
}

impl Iterator for Coordinates<'_> {
    type Item = Coordinate;

    fn next(&mut self) -> Option<Coordinate> {
        if self.next >= self.grid.total_pixels() {
            return None;
        }
        let cols = self.grid.shape.1;
        let cell = CellIndex::new(self.next / cols, self.next % cols);
        self.next += 1;
        Some(self.grid.coordinate_at(cell))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.total_pixels().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Coordinates<'_> {}
