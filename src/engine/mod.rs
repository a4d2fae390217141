pub mod lifecycle;
pub mod scanner;
pub mod scheduler;
pub mod session;
pub mod sync;
pub mod watcher;

pub use lifecycle::*;
pub use scanner::*;
pub use scheduler::*;
pub use session::*;
pub use sync::*;
pub use watcher::*;

#[cfg(test)]
pub(crate) use lifecycle::test_support;
