// src/recording/mod.rs
//! Event ingestion and bounded retention
//!
//! - **Event**: opaque timestamped record from the external producer
//! - **Emitter**: emission hook the producer calls per event
//! - **Retention**: in-memory window with append+evict as one step
//! - **Eviction**: time-window or checkpoint-segment strategies
//! - **Exporter**: serialization of a captured window
//!
//! # Architecture
//!
//! ```text
//! Producer → Emitter::emit() → RetentionBuffer (lock, push, evict, unlock)
//!                                     ↓
//!                              snapshot() → Vec<Event> → Exporter → Bytes
//! ```

pub mod emitter;
pub mod event;
pub mod eviction;
pub mod exporter;
pub mod retention;

// Re-export commonly used types
pub use emitter::{Emitter, ProducerOptions};
pub use event::Event;
pub use eviction::{EvictionPolicy, SegmentEviction, TimeWindowEviction};
pub use exporter::{CaptureSerializer, ExportFormat, Exporter};
pub use retention::{RetentionBuffer, RetentionStats, RetentionWindow};
