use thiserror::Error;

use crate::crs::EpsgCode;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("unsupported CRS: EPSG:{0}")]
    UnsupportedCrs(EpsgCode),
    #[error("invalid geographic coordinate: lng={lng}, lat={lat}")]
    InvalidCoordinate { lng: f64, lat: f64 },
    #[error("coordinate ({x}, {y}) is outside the projection domain")]
    OutOfDomain { x: f64, y: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("corrupt grid `{id}`: {reason}")]
    CorruptGrid { id: String, reason: String },
    #[error("grid `{0}` not found in any search path")]
    NotFound(String),
    #[error("cannot select sub-grid of `{id}`: {reason}")]
    SubgridSelection { id: String, reason: String },
    #[error("I/O error while loading grid `{id}`: {message}")]
    Io { id: String, message: String },
}

impl GridError {
    pub(crate) fn corrupt(id: &str, reason: impl Into<String>) -> Self {
        Self::CorruptGrid {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// A grid was sampled outside the rectangle its nodes span.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("({lng}, {lat}) is outside grid coverage")]
pub struct OutOfCoverage {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShiftError {
    #[error("no shift grid covers ({lng}, {lat})")]
    NoCoverage { lng: f64, lat: f64 },
    #[error("inverse shift did not converge after {iterations} iterations (residual {residual:e} deg)")]
    ConvergenceFailure { iterations: usize, residual: f64 },
    #[error("no grid shift registered between `{source_datum}` and `{target_datum}`")]
    NoOperation {
        source_datum: String,
        target_datum: String,
    },
    #[error(transparent)]
    Grid(#[from] GridError),
}
