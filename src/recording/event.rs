// src/recording/event.rs
//! Replay events produced by the external recorder

use serde::{Deserialize, Serialize};

/// One recorded unit of UI state change
///
/// The monitor only looks at `timestamp`; `payload` is carried opaquely and
/// exported as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Milliseconds since a session-wide epoch, non-decreasing per producer
    pub timestamp: u64,

    /// Producer-defined event body
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(timestamp: u64, payload: serde_json::Value) -> Self {
        Self { timestamp, payload }
    }

    /// Event with a null payload, mostly useful in tests and benches
    pub fn at(timestamp: u64) -> Self {
        Self::new(timestamp, serde_json::Value::Null)
    }
}
