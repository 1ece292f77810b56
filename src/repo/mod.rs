pub mod backend;
pub mod entity;

pub use backend::*;
pub use entity::*;
