// src/recording/emitter.rs
//! Emission hook handed to the external event producer

use crate::recording::event::Event;
use crate::recording::retention::RetentionBuffer;
use crate::utils::config::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cloneable handle the producer calls once per emitted event
#[derive(Clone, Debug)]
pub struct Emitter {
    buffer: Arc<RetentionBuffer>,
}

impl Emitter {
    pub fn new(buffer: Arc<RetentionBuffer>) -> Self {
        Self { buffer }
    }

    /// Emit a regular event
    pub fn emit(&self, event: Event) {
        self.buffer.ingest(event);
    }

    /// Emit an event that starts a new checkpoint (a full re-snapshot on the
    /// producer side)
    pub fn emit_checkpoint(&self, event: Event) {
        self.buffer.ingest_checkpoint(event);
    }

    /// Emit with the producer's checkout flag
    pub fn emit_with(&self, event: Event, is_checkpoint: bool) {
        if is_checkpoint {
            self.emit_checkpoint(event);
        } else {
            self.emit(event);
        }
    }
}

/// Options for the external producer
///
/// User options pass through untouched; `checkout_every_ms` is owned by the
/// monitor and always equals the retention window length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerOptions {
    #[serde(rename = "checkoutEveryNms")]
    pub checkout_every_ms: u64,

    #[serde(flatten)]
    pub passthrough: serde_json::Map<String, serde_json::Value>,
}

impl ProducerOptions {
    pub fn from_config(config: &MonitorConfig) -> Self {
        let mut passthrough = config.recorder_options.clone();
        // The emission hook and checkout cadence belong to the monitor
        passthrough.remove("emit");
        passthrough.remove("checkoutEveryNms");

        Self {
            checkout_every_ms: config.record_time_ms,
            passthrough,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::eviction::SegmentEviction;

    #[test]
    fn test_emitter_feeds_buffer() {
        let buffer = Arc::new(RetentionBuffer::new(Box::new(
            SegmentEviction::producer_driven(),
        )));
        let emitter = Emitter::new(Arc::clone(&buffer));
        let clone = emitter.clone();

        emitter.emit_with(Event::at(0), true);
        clone.emit(Event::at(1));
        clone.emit_with(Event::at(2), false);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.stats().checkpoints, 1);
    }

    #[test]
    fn test_producer_options_override_owned_keys() {
        let mut config = MonitorConfig::default();
        config
            .recorder_options
            .insert("checkoutEveryNms".into(), serde_json::json!(1));
        config
            .recorder_options
            .insert("emit".into(), serde_json::json!("nope"));
        config
            .recorder_options
            .insert("blockClass".into(), serde_json::json!("private"));

        let options = ProducerOptions::from_config(&config);
        assert_eq!(options.checkout_every_ms, 10_000);

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["checkoutEveryNms"], 10_000);
        assert_eq!(json["blockClass"], "private");
        assert!(json.get("emit").is_none());
    }
}
