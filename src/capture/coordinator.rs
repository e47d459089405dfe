// src/capture/coordinator.rs
//! Error-triggered delayed capture
//!
//! Every signal runs the same pipeline regardless of its kind:
//!
//! ```text
//! Signaled ──► on_error callback (sync, panics caught)
//!    │
//!    ├─ no export callback ──► done (nothing scheduled, nothing serialized)
//!    ▼
//! Scheduled ──sleep(delay)──► Captured ──serialize──► Exported
//!    │                            │
//!    └─ shutdown ──► Cancelled     └─ serializer error / callback panic ──► Failed
//! ```
//!
//! Captures are independent: overlapping signals each get their own snapshot
//! and their own export call.

use crate::capture::descriptor::ErrorDescriptor;
use crate::capture::signals::{panic_message, suppress_signals, SignalSource, Subscription};
use crate::observability::metrics as m;
use crate::recording::event::Event;
use crate::recording::exporter::{CaptureSerializer, Exporter};
use crate::recording::retention::RetentionBuffer;
use crate::utils::errors::{MonitorError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Immediate notification for every signal
pub type ErrorNotifier = Arc<dyn Fn(&ErrorDescriptor) + Send + Sync>;

/// Receives each completed capture
pub type CaptureHandler = Arc<dyn Fn(CaptureSnapshot) + Send + Sync>;

/// Observability hook for captures that never reached the export callback
pub type CaptureFailureHook = Arc<dyn Fn(&CaptureFailure) + Send + Sync>;

/// A frozen copy of the retention window plus its serialized form
#[derive(Debug, Clone)]
pub struct CaptureSnapshot {
    pub id: Ulid,

    /// Owned copy of the retained events at capture time
    pub events: Vec<Event>,

    /// Serialized `events`
    pub payload: Bytes,

    pub content_type: &'static str,

    /// The signal that triggered this capture
    pub descriptor: ErrorDescriptor,

    pub captured_at: DateTime<Utc>,
}

/// Where a capture failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Serialize,
    Export,
}

/// A capture that was lost after being scheduled
#[derive(Debug, Clone)]
pub struct CaptureFailure {
    pub id: Ulid,
    pub stage: CaptureStage,
    pub reason: String,
    pub descriptor: ErrorDescriptor,
}

/// Coordinator counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub signals: u64,
    pub scheduled: u64,
    pub exported: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Counters {
    signals: AtomicU64,
    scheduled: AtomicU64,
    exported: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

/// Builder for `CaptureCoordinator`
pub struct CoordinatorBuilder {
    buffer: Arc<RetentionBuffer>,
    delay: Duration,
    serializer: Arc<dyn CaptureSerializer>,
    on_error: Option<ErrorNotifier>,
    on_capture: Option<CaptureHandler>,
    on_capture_failed: Option<CaptureFailureHook>,
}

impl CoordinatorBuilder {
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn CaptureSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn on_error(mut self, notifier: Option<ErrorNotifier>) -> Self {
        self.on_error = notifier;
        self
    }

    pub fn on_capture(mut self, handler: Option<CaptureHandler>) -> Self {
        self.on_capture = handler;
        self
    }

    pub fn on_capture_failed(mut self, hook: Option<CaptureFailureHook>) -> Self {
        self.on_capture_failed = hook;
        self
    }

    /// Build the coordinator on the current tokio runtime
    pub fn build(self) -> Result<CaptureCoordinator> {
        let runtime = Handle::try_current().map_err(|e| {
            MonitorError::RuntimeError(format!("Capture coordinator needs a tokio runtime: {}", e))
        })?;

        Ok(CaptureCoordinator {
            buffer: self.buffer,
            delay: self.delay,
            serializer: self.serializer,
            on_error: self.on_error,
            on_capture: self.on_capture,
            on_capture_failed: self.on_capture_failed,
            runtime,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            counters: Arc::new(Counters::default()),
        })
    }
}

/// Turns failure signals into delayed captures of the retention buffer
pub struct CaptureCoordinator {
    buffer: Arc<RetentionBuffer>,
    delay: Duration,
    serializer: Arc<dyn CaptureSerializer>,
    on_error: Option<ErrorNotifier>,
    on_capture: Option<CaptureHandler>,
    on_capture_failed: Option<CaptureFailureHook>,
    runtime: Handle,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
}

impl CaptureCoordinator {
    pub fn builder(buffer: Arc<RetentionBuffer>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            buffer,
            delay: Duration::from_millis(2_000),
            serializer: Arc::new(Exporter::default()),
            on_error: None,
            on_capture: None,
            on_capture_failed: None,
        }
    }

    /// Handle one failure signal
    ///
    /// Never blocks and never fails. Returns the capture id when a capture
    /// was scheduled.
    pub fn on_signal(&self, descriptor: ErrorDescriptor) -> Option<Ulid> {
        self.counters.signals.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::SIGNALS, "kind" => descriptor.kind.as_str()).increment(1);
        info!("Error signal received: {}", descriptor.summary());

        if let Some(notify) = &self.on_error {
            if let Err(payload) =
                catch_unwind(AssertUnwindSafe(|| suppress_signals(|| notify(&descriptor))))
            {
                warn!("on_record_error callback panicked: {}", panic_message(payload.as_ref()));
            }
        }

        let handler = match &self.on_capture {
            Some(handler) => Arc::clone(handler),
            None => return None,
        };

        if self.shutdown.is_cancelled() {
            debug!("Coordinator shut down, not scheduling capture");
            return None;
        }

        let job = CaptureJob {
            id: Ulid::new(),
            delay: self.delay,
            descriptor,
            buffer: Arc::clone(&self.buffer),
            serializer: Arc::clone(&self.serializer),
            handler,
            failure_hook: self.on_capture_failed.clone(),
            counters: Arc::clone(&self.counters),
        };
        let id = job.id;

        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::CAPTURES_SCHEDULED).increment(1);
        debug!("Capture {} scheduled in {:?}", id, self.delay);

        self.tracker
            .spawn_on(job.run(self.shutdown.clone()), &self.runtime);

        Some(id)
    }

    /// Subscribe to `source`; the coordinator is held weakly so the
    /// subscription does not keep it alive
    pub fn attach(self: &Arc<Self>, source: &dyn SignalSource) -> Subscription {
        let coordinator = Arc::downgrade(self);
        source.subscribe(Arc::new(move |descriptor: ErrorDescriptor| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.on_signal(descriptor);
            }
        }))
    }

    /// Whether an export callback is configured
    pub fn exports(&self) -> bool {
        self.on_capture.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Number of captures waiting for their delay or running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every scheduled capture has finished
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        // A shutdown that raced with us keeps the tracker closed
        if !self.shutdown.is_cancelled() {
            self.tracker.reopen();
        }
    }

    /// Cancel pending captures and wait for in-flight ones
    ///
    /// Signals arriving afterwards still reach `on_error` but schedule nothing.
    pub async fn shutdown(&self) {
        info!("Shutting down capture coordinator ({} pending)", self.pending());
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            signals: self.counters.signals.load(Ordering::Relaxed),
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            exported: self.counters.exported.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}

impl std::fmt::Debug for CaptureCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCoordinator")
            .field("delay", &self.delay)
            .field("exports", &self.exports())
            .field("stats", &self.stats())
            .finish()
    }
}

/// One scheduled capture
struct CaptureJob {
    id: Ulid,
    delay: Duration,
    descriptor: ErrorDescriptor,
    buffer: Arc<RetentionBuffer>,
    serializer: Arc<dyn CaptureSerializer>,
    handler: CaptureHandler,
    failure_hook: Option<CaptureFailureHook>,
    counters: Arc<Counters>,
}

impl CaptureJob {
    async fn run(self, shutdown: CancellationToken) {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::CAPTURES_CANCELLED).increment(1);
                debug!("Capture {} cancelled before its delay elapsed", self.id);
                return;
            }
            _ = tokio::time::sleep(self.delay) => {}
        }

        let events = self.buffer.snapshot();
        let payload = match self.serializer.serialize(&events) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(CaptureStage::Serialize, e.to_string());
                return;
            }
        };

        debug!(
            "Capture {} froze {} events ({} bytes)",
            self.id,
            events.len(),
            payload.len()
        );

        let snapshot = CaptureSnapshot {
            id: self.id,
            events,
            payload,
            content_type: self.serializer.content_type(),
            descriptor: self.descriptor.clone(),
            captured_at: Utc::now(),
        };

        let handler = Arc::clone(&self.handler);
        match catch_unwind(AssertUnwindSafe(move || suppress_signals(|| handler(snapshot)))) {
            Ok(()) => {
                self.counters.exported.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::CAPTURES_EXPORTED).increment(1);
            }
            Err(payload) => {
                self.fail(CaptureStage::Export, panic_message(payload.as_ref()));
            }
        }
    }

    fn fail(&self, stage: CaptureStage, reason: String) {
        warn!("Capture {} failed during {:?}: {}", self.id, stage, reason);
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::CAPTURES_FAILED).increment(1);

        if let Some(hook) = &self.failure_hook {
            let failure = CaptureFailure {
                id: self.id,
                stage,
                reason,
                descriptor: self.descriptor.clone(),
            };
            if catch_unwind(AssertUnwindSafe(|| suppress_signals(|| hook(&failure)))).is_err() {
                warn!("on_capture_failed hook panicked for capture {}", self.id);
            }
        }
    }
}
