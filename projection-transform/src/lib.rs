//! Geodetic building blocks: ellipsoids, projections, CRS definitions and
//! grid-based datum shifts.

pub mod cartesian;
pub mod crs;
pub mod ellipsoid;
pub mod error;
pub mod etmerc;
pub mod grid;
pub mod gridshift;
pub mod jprect;

pub use error::{GridError, OutOfCoverage, ProjectionError, ShiftError};
