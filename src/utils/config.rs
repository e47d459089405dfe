// src/utils/config.rs
//! Configuration for the monitor and the `replay-monitor` binary
//!
//! Layering (lowest to highest precedence):
//!
//! 1. Built-in defaults
//! 2. Optional config file (`replay-monitor.{toml,yaml,json}` or `$REPLAY_MONITOR_CONFIG`)
//! 3. Environment variables, e.g. `REPLAY_MONITOR__MONITOR__RECORD_TIME_MS=5000`

use crate::utils::errors::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default preview page that replays an uploaded capture
pub const DEFAULT_PREVIEW_BASE_URL: &str = "https://qgtiger.github.io/rrweb-preview/";

/// Retention policy selected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionMode {
    /// Keep every event within `record_time_ms` of the newest one
    #[default]
    TimeWindow,

    /// Keep the current and previous checkpoint segments
    CheckpointSegments,
}

/// Core monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Retention window length (milliseconds)
    #[serde(alias = "recordTime")]
    pub record_time_ms: u64,

    /// Delay between an error signal and its capture (milliseconds)
    #[serde(alias = "deleyRecordTime", alias = "delayRecordTime")]
    pub delay_record_time_ms: u64,

    /// Eviction policy
    pub eviction: EvictionMode,

    /// Segment policy opens a new segment on its own every `record_time_ms`
    /// instead of relying only on producer checkpoints
    pub self_checkpoint: bool,

    /// Options passed through to the event producer
    #[serde(alias = "rrwebRecordOptions")]
    pub recorder_options: serde_json::Map<String, serde_json::Value>,

    /// Base URL of the replay preview page
    pub preview_base_url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            record_time_ms: 10_000,      // 10s window
            delay_record_time_ms: 2_000, // 2s of post-error context
            eviction: EvictionMode::TimeWindow,
            self_checkpoint: true,
            recorder_options: serde_json::Map::new(),
            preview_base_url: DEFAULT_PREVIEW_BASE_URL.to_string(),
        }
    }
}

impl MonitorConfig {
    /// Capture delay as a `Duration`
    pub fn capture_delay(&self) -> Duration {
        Duration::from_millis(self.delay_record_time_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.record_time_ms == 0 {
            return Err(MonitorError::ConfigError(
                "record_time_ms must be greater than 0".to_string(),
            ));
        }
        if self.preview_base_url.is_empty() {
            return Err(MonitorError::ConfigError(
                "preview_base_url cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,

    pub log_format: LogFormat,

    /// Install the Prometheus recorder and log its rendering on shutdown
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics: false,
        }
    }
}

/// Where the binary writes exported captures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("captures"),
        }
    }
}

/// Top-level configuration of the `replay-monitor` binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub observability: ObservabilityConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load from the default file location plus environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var("REPLAY_MONITOR_CONFIG")
            .unwrap_or_else(|_| "replay-monitor".to_string());
        Self::load_from(&path)
    }

    /// Load from `path` (missing file is fine) plus environment overrides
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("REPLAY_MONITOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        app.monitor.validate()?;
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_monitor_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.record_time_ms, 10_000);
        assert_eq!(config.delay_record_time_ms, 2_000);
        assert_eq!(config.eviction, EvictionMode::TimeWindow);
        assert_eq!(config.capture_delay(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_record_time_rejected() {
        let config = MonitorConfig {
            record_time_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MonitorError::ConfigError(_))
        ));
    }

    #[test]
    fn test_camel_case_aliases() {
        let config: MonitorConfig = serde_json::from_value(serde_json::json!({
            "recordTime": 5000,
            "deleyRecordTime": 500,
            "rrwebRecordOptions": {"sampling": {"scroll": 150}}
        }))
        .unwrap();

        assert_eq!(config.record_time_ms, 5000);
        assert_eq!(config.delay_record_time_ms, 500);
        assert!(config.recorder_options.contains_key("sampling"));
        assert_eq!(config.preview_base_url, DEFAULT_PREVIEW_BASE_URL);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[monitor]
record_time_ms = 3000
eviction = "checkpoint_segments"

[observability]
log_format = "json"

[output]
dir = "/tmp/out"
"#
        )
        .unwrap();

        let app = AppConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(app.monitor.record_time_ms, 3000);
        assert_eq!(app.monitor.delay_record_time_ms, 2000);
        assert_eq!(app.monitor.eviction, EvictionMode::CheckpointSegments);
        assert_eq!(app.observability.log_format, LogFormat::Json);
        assert_eq!(app.output.dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let app = AppConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(app.monitor.record_time_ms, 10_000);
        assert!(!app.observability.metrics);
    }
}
