// Core data models for Pipeboard
// These structs represent the pipeline entities and their stage tables

pub mod entity;
pub mod stage;

pub use entity::*;
pub use stage::*;
