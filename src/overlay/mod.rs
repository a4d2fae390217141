pub mod controller;
pub mod renderer;

pub use controller::*;
pub use renderer::*;
