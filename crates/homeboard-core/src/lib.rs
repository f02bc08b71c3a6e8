pub mod config;
pub mod error;
pub mod types;

pub use config::HomeboardConfig;
pub use error::{HomeboardError, Result};
pub use types::Schedule;
