use projection_transform::{crs::EpsgCode, ProjectionError, ShiftError};
use thiserror::Error;

/// A failed transform, tagged with the stage that failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// The source coordinate has no geographic position.
    #[error("source projection failed: {0}")]
    Projection(ProjectionError),
    #[error("datum shift failed: {0}")]
    Shift(#[from] ShiftError),
    /// The shifted position cannot be expressed in the target CRS.
    #[error("target projection failed: {0}")]
    Reprojection(ProjectionError),
    #[error("unsupported CRS: EPSG:{0}")]
    UnsupportedCrs(EpsgCode),
}
