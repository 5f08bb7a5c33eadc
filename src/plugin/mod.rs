// Plugin hosting seam - the graph only sees `Plugin` trait objects;
// loading binaries and parameter UIs live outside this crate

pub mod trait_def;

pub use trait_def::*;

use thiserror::Error;

/// Plugin-related errors
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Plugin processing failed: {0}")]
    ProcessingFailed(String),
}

pub type PluginResult<T> = Result<T, PluginError>;
