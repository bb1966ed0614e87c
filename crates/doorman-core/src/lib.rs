//! Shared types, configuration and errors for the doorman reader pipeline.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{FrameLayout, PipelineConfig, Settings};
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
