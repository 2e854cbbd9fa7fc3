pub mod error;
pub mod header;
pub mod pointcloud;

pub use error::{Error, Result};
pub use header::{CrsId, Header, Version};
pub use pointcloud::{
    codec::{decode, encode},
    layout::RecordLayout,
    point::{BoundingVolume, Point},
    record::PointRecord,
};
