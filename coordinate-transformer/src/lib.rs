mod error;
mod transformer;

pub use error::TransformError;
pub use projection_transform::crs::{
    EpsgCode, EPSG_WGS84_GEOCENTRIC, EPSG_WGS84_GEOGRAPHIC_2D, EPSG_WGS84_GEOGRAPHIC_3D,
};
pub use transformer::{CoordinateTransformer, PointTransformer};
