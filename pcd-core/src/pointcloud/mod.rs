pub mod codec;
pub mod layout;
pub mod point;
pub mod record;
