pub mod blacklist;
pub mod settings;
pub mod speeds;
pub mod storage;

#[cfg(test)]
mod settings_test;

pub use blacklist::*;
pub use settings::*;
pub use speeds::*;
pub use storage::*;
