pub mod dispatch;
pub mod drag;
pub mod keybinds;

pub use dispatch::*;
pub use drag::*;
pub use keybinds::*;
