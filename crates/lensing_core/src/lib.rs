pub mod coordinate;
pub mod cosmology;
pub mod error;
pub mod galaxy;
pub mod grid;
pub mod mass_profiles;
mod parallel;
pub mod positions;
pub mod ray_tracing;
/// The `lensing_core` crate traces light rays through stacks of gravitational
/// lens planes and solves for the image-plane positions of point sources.
///
/// Key components:
/// - **Traits**: `DeflectionSource` (anything that bends light), `LensSystem` (a traceable stack of planes).
/// - **Mass profiles**: point mass, isothermal ellipsoid, NFW sphere, external shear and mass sheet.
/// - **Tracer**: galaxies grouped into redshift-ordered planes with cosmological distance ratios.
/// - **Grid**: uniform image-plane grids that upscale without moving their edges.
/// - **Positions**: grid-refinement root finding, cluster merging and magnifications.
pub mod traits;
pub mod tracer;

pub use coordinate::Coordinate;
pub use cosmology::{Cosmology, FlatLambdaCdm};
pub use error::{LensError, LensResult};
pub use galaxy::{Galaxy, Plane};
pub use grid::{CellIndex, Grid2D};
pub use mass_profiles::MassProfile;
pub use positions::{PositionsSolver, Solution, SolveReport, SolverConfig};
pub use traits::{DeflectionSource, LensSystem};
pub use tracer::Tracer;
