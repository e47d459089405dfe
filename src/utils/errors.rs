// src/utils/errors.rs
//! Error types for the replay monitor

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors surfaced by the monitor
///
/// Only configuration problems and the manual report flow produce these.
/// Automatic captures never return errors to the signal source.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Invalid or unloadable configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A collaborator required by the requested operation is not configured
    #[error("{0} is required")]
    MissingCollaborator(&'static str),

    /// Captured events could not be serialized
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// Upload of a captured payload failed
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// Runtime context problems (no tokio runtime, task join failures)
    #[error("runtime error: {0}")]
    RuntimeError(String),
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::SerializationFailed(e.to_string())
    }
}

impl From<::config::ConfigError> for MonitorError {
    fn from(e: ::config::ConfigError) -> Self {
        MonitorError::ConfigError(e.to_string())
    }
}
