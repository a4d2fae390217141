pub mod document;
pub mod error;
pub mod events;
pub mod node;
pub mod scenario;

pub use document::*;
pub use error::*;
pub use events::*;
pub use node::*;
pub use scenario::*;
