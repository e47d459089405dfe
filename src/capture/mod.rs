// src/capture/mod.rs
//! Error-triggered capture
//!
//! - **Descriptor**: structured record of one failure
//! - **Signals**: injected signal sources (`SignalHub`, `PanicHookSource`)
//! - **Coordinator**: delayed, independent capture per signal
//! - **Report**: manual capture + upload + preview link
//! - **Uploader**: byte sink → URL, with a presigned HTTP implementation
//!
//! # Timing
//!
//! ```text
//! t0            t0 + delay
//! │ signal      │ snapshot → serialize → export
//! ▼             ▼
//! ─────[ retained window ]──────────────────────►  ingestion keeps going
//!  t0 - record_time
//! ```

pub mod coordinator;
pub mod descriptor;
pub mod panic_hook;
pub mod report;
pub mod signals;
pub mod uploader;

// Re-export commonly used types
pub use coordinator::{
    CaptureCoordinator, CaptureFailure, CaptureFailureHook, CaptureHandler, CaptureSnapshot,
    CaptureStage, CoordinatorStats, ErrorNotifier,
};
pub use descriptor::{ErrorDescriptor, ErrorKind};
pub use panic_hook::{PanicHookGuard, PanicHookSource};
pub use report::{preview_url, Reporter};
pub use signals::{SignalHandler, SignalHub, SignalSource, Subscription};
pub use uploader::{EventUploader, HttpUploader, HttpUploaderConfig, UploadFile};
