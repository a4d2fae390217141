pub mod catalog;
pub mod segments;
pub mod strategy;

pub use catalog::*;
pub use segments::*;
pub use strategy::*;
