// src/observability/mod.rs
//! Logging and metrics setup
//!
//! Library code only emits `tracing` events and `metrics` samples; the binary
//! decides whether a subscriber and a Prometheus recorder get installed.

pub mod metrics;

use crate::utils::config::{LogFormat, ObservabilityConfig};
use crate::utils::errors::{MonitorError, Result};
use tracing_subscriber::EnvFilter;

pub use self::metrics::{init_metrics, render_metrics};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `config.log_level` when set.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| MonitorError::ConfigError(format!("Invalid log filter: {}", e)))?;

    let installed = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };

    installed.map_err(|e| MonitorError::ConfigError(format!("Failed to install tracing: {}", e)))
}
