pub mod types;
pub mod config;
pub mod error;

pub use types::*;
pub use config::{Config, MonitorSettings};
pub use error::VandalWatchError;
