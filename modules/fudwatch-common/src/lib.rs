pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ScanStrategy};
pub use error::FudWatchError;
pub use types::*;
