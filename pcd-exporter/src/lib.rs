pub mod las;

pub use las::LasPointWriter;
