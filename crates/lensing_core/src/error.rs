//! Error types shared by the tracer, grid and positions solver.

use thiserror::Error;

use crate::coordinate::Coordinate;

/// Result alias used throughout the crate.
pub type LensResult<T> = Result<T, LensError>;

#[derive(Debug, Error)]
pub enum LensError {
    #[error("plane index {index} is out of range for a tracer with {plane_count} planes")]
    InvalidPlaneIndex { index: usize, plane_count: usize },

    #[error(
        "magnification is degenerate at {coordinate} on plane {plane_index} (det(A) = {determinant:e})"
    )]
    DegenerateMagnification {
        coordinate: Coordinate,
        plane_index: usize,
        determinant: f64,
    },

    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("invalid lens model: {0}")]
    InvalidModel(String),

    #[error("refinement level {level} needs {cells} cells, above the limit of {limit}")]
    RefinementOverflow {
        level: usize,
        cells: usize,
        limit: usize,
    },

    #[error("failed to parse solver configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
