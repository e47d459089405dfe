// src/lib.rs
//! Replay Monitor Library
//!
//! A flight recorder for UI errors: keeps a bounded window of recent replay
//! events in memory and, when a failure is signaled, exports the window
//! covering the moments around it.
//!
//! # Architecture
//!
//! - **recording**: event ingestion, bounded retention, eviction policies,
//!   serialization
//! - **capture**: error descriptors, signal sources, the delayed capture
//!   coordinator, manual report and upload
//! - **monitor**: the `Monitor` facade wiring both together
//! - **observability**: tracing subscriber and Prometheus metrics
//! - **utils**: configuration and errors

// Public module exports
pub mod capture;
pub mod monitor;
pub mod observability;
pub mod recording;
pub mod utils;

// Re-export commonly used types
pub use capture::{CaptureSnapshot, ErrorDescriptor, ErrorKind, SignalHub, SignalSource};
pub use monitor::{Monitor, MonitorBuilder};
pub use recording::{Emitter, Event, RetentionBuffer};
pub use utils::config::{AppConfig, EvictionMode, MonitorConfig};
pub use utils::errors::{MonitorError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
