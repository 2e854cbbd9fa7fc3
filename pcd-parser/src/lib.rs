pub mod reader;

pub use reader::{las::LasPointReader, PointIterator, PointReader};
