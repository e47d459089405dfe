// src/monitor.rs
//! The monitor: retention buffer, capture coordinator and signal wiring in
//! one handle
//!
//! ```no_run
//! # async fn demo() -> replay_monitor::Result<()> {
//! use replay_monitor::capture::SignalHub;
//! use replay_monitor::recording::Event;
//! use replay_monitor::{Monitor, MonitorConfig};
//!
//! let hub = SignalHub::new();
//! let monitor = Monitor::builder(MonitorConfig::default())
//!     .on_record_error_events(|capture| {
//!         println!("{} events before {}", capture.events.len(), capture.descriptor.summary());
//!     })
//!     .signal_source(hub.clone())
//!     .build()?;
//!
//! monitor.emitter().emit(Event::at(0));
//! hub.on_unhandled_rejection(serde_json::json!("boom"));
//! monitor.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::capture::coordinator::{
    CaptureCoordinator, CaptureFailure, CaptureFailureHook, CaptureHandler, CaptureSnapshot,
    CoordinatorStats, ErrorNotifier,
};
use crate::capture::descriptor::ErrorDescriptor;
use crate::capture::report::Reporter;
use crate::capture::signals::{SignalSource, Subscription};
use crate::capture::uploader::EventUploader;
use crate::recording::emitter::{Emitter, ProducerOptions};
use crate::recording::event::Event;
use crate::recording::eviction::EvictionPolicy;
use crate::recording::exporter::{CaptureSerializer, Exporter};
use crate::recording::retention::{RetentionBuffer, RetentionStats};
use crate::utils::config::MonitorConfig;
use crate::utils::errors::Result;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::info;
use ulid::Ulid;

/// Builder for `Monitor`
pub struct MonitorBuilder {
    config: MonitorConfig,
    on_record_error: Option<ErrorNotifier>,
    on_record_error_events: Option<CaptureHandler>,
    on_capture_failed: Option<CaptureFailureHook>,
    serializer: Arc<dyn CaptureSerializer>,
    uploader: Option<Arc<dyn EventUploader>>,
    eviction: Option<Box<dyn EvictionPolicy>>,
    sources: Vec<Arc<dyn SignalSource>>,
}

impl MonitorBuilder {
    /// Immediate notification for every error signal
    pub fn on_record_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ErrorDescriptor) + Send + Sync + 'static,
    {
        self.on_record_error = Some(Arc::new(callback));
        self
    }

    /// Receives every capture once its delay has elapsed
    pub fn on_record_error_events<F>(mut self, callback: F) -> Self
    where
        F: Fn(CaptureSnapshot) + Send + Sync + 'static,
    {
        self.on_record_error_events = Some(Arc::new(callback));
        self
    }

    /// Told about captures lost to serialization errors or export panics
    pub fn on_capture_failed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CaptureFailure) + Send + Sync + 'static,
    {
        self.on_capture_failed = Some(Arc::new(callback));
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn CaptureSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Byte sink used by `capture_and_report`
    pub fn uploader<U>(mut self, uploader: U) -> Self
    where
        U: EventUploader + 'static,
    {
        self.uploader = Some(Arc::new(uploader));
        self
    }

    /// Use a custom eviction policy instead of the configured one
    pub fn eviction(mut self, policy: Box<dyn EvictionPolicy>) -> Self {
        self.eviction = Some(policy);
        self
    }

    /// Subscribe to `source` when the monitor is built
    pub fn signal_source<S>(mut self, source: S) -> Self
    where
        S: SignalSource + 'static,
    {
        self.sources.push(Arc::new(source));
        self
    }

    /// Validate configuration, build the pipeline, attach signal sources
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Monitor> {
        self.config.validate()?;

        let policy = match self.eviction {
            Some(policy) => policy,
            None => crate::recording::eviction::policy_for(&self.config),
        };
        let buffer = Arc::new(RetentionBuffer::new(policy));

        let coordinator = Arc::new(
            CaptureCoordinator::builder(Arc::clone(&buffer))
                .delay(self.config.capture_delay())
                .serializer(Arc::clone(&self.serializer))
                .on_error(self.on_record_error)
                .on_capture(self.on_record_error_events)
                .on_capture_failed(self.on_capture_failed)
                .build()?,
        );

        let reporter = Reporter::new(
            Arc::clone(&buffer),
            self.serializer,
            self.uploader,
            self.config.capture_delay(),
            self.config.preview_base_url.clone(),
        );

        let subscriptions = self
            .sources
            .iter()
            .map(|source| coordinator.attach(source.as_ref()))
            .collect();

        info!(
            "Monitor started: {}ms window ({}), {}ms capture delay, {} signal sources",
            self.config.record_time_ms,
            buffer.policy_name(),
            self.config.delay_record_time_ms,
            self.sources.len()
        );

        Ok(Monitor {
            config: self.config,
            buffer,
            coordinator,
            reporter,
            subscriptions: Mutex::new(subscriptions),
        })
    }
}

/// Flight recorder for errors
pub struct Monitor {
    config: MonitorConfig,
    buffer: Arc<RetentionBuffer>,
    coordinator: Arc<CaptureCoordinator>,
    reporter: Reporter,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Monitor {
    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder {
            config,
            on_record_error: None,
            on_record_error_events: None,
            on_capture_failed: None,
            serializer: Arc::new(Exporter::default()),
            uploader: None,
            eviction: None,
            sources: Vec::new(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Emission hook for the event producer
    pub fn emitter(&self) -> Emitter {
        Emitter::new(Arc::clone(&self.buffer))
    }

    /// Options to start the event producer with
    pub fn producer_options(&self) -> ProducerOptions {
        ProducerOptions::from_config(&self.config)
    }

    /// Owned copy of the currently retained events
    pub fn record_events(&self) -> Vec<Event> {
        self.buffer.snapshot()
    }

    /// Feed a descriptor straight to the coordinator
    pub fn on_signal(&self, descriptor: ErrorDescriptor) -> Option<Ulid> {
        self.coordinator.on_signal(descriptor)
    }

    /// Subscribe to another signal source
    pub fn attach(&self, source: &dyn SignalSource) {
        let subscription = self.coordinator.attach(source);
        self.subscriptions.lock().push(subscription);
    }

    /// Unsubscribe from every signal source
    pub fn detach(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        if !subscriptions.is_empty() {
            info!("Detaching from {} signal sources", subscriptions.len());
        }
        drop(subscriptions);
    }

    /// Capture the current window, upload it and await `continuation` with
    /// the preview URL
    pub async fn capture_and_report<F, Fut, T>(&self, continuation: F) -> Result<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = T>,
    {
        self.reporter.capture_and_report(continuation).await
    }

    pub fn retention_stats(&self) -> RetentionStats {
        self.buffer.stats()
    }

    pub fn capture_stats(&self) -> CoordinatorStats {
        self.coordinator.stats()
    }

    /// Wait for every scheduled capture to finish
    pub async fn drain(&self) {
        self.coordinator.drain().await;
    }

    /// Detach from signal sources and cancel pending captures
    pub async fn shutdown(&self) {
        self.detach();
        self.coordinator.shutdown().await;
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("buffer", &self.buffer)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
