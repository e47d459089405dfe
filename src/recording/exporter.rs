// src/recording/exporter.rs
//! Serialization of captured events into an export payload
//!
//! The payload is only consumed by caller-supplied callbacks and uploaders,
//! so the format is not a wire contract. JSON is the default.

use crate::recording::event::Event;
use crate::utils::errors::{MonitorError, Result};
use bytes::Bytes;
use tracing::debug;

/// Turns a captured event sequence into bytes
pub trait CaptureSerializer: Send + Sync {
    fn serialize(&self, events: &[Event]) -> Result<Bytes>;

    /// MIME type of the produced payload
    fn content_type(&self) -> &'static str;
}

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Compact JSON array
    #[default]
    Json,

    /// Indented JSON array
    JsonPretty,
}

/// Built-in serializer for captured events
#[derive(Debug, Clone, Copy, Default)]
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }
}

impl CaptureSerializer for Exporter {
    fn serialize(&self, events: &[Event]) -> Result<Bytes> {
        debug!("Serializing {} events as {:?}", events.len(), self.format);

        let bytes = match self.format {
            ExportFormat::Json => serde_json::to_vec(events),
            ExportFormat::JsonPretty => serde_json::to_vec_pretty(events),
        }
        .map_err(|e| MonitorError::SerializationFailed(format!("JSON serialization error: {}", e)))?;

        Ok(Bytes::from(bytes))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}
