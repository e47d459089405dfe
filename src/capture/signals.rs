// src/capture/signals.rs
//! Failure signal sources
//!
//! The coordinator never binds to ambient globals. It subscribes to injected
//! `SignalSource`s and detaches by dropping the returned `Subscription`.
//!
//! `SignalHub` is the in-process source: platform glue (or a test) calls its
//! `on_error` / `on_resource_error` / `on_unhandled_rejection` entry points,
//! which translate raw failure data into `ErrorDescriptor`s.

use crate::capture::descriptor::ErrorDescriptor;
use dashmap::DashMap;
use futures::FutureExt;
use std::cell::Cell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Callback invoked for every raised descriptor
pub type SignalHandler = Arc<dyn Fn(ErrorDescriptor) + Send + Sync>;

/// Something that emits failure signals
pub trait SignalSource: Send + Sync {
    fn subscribe(&self, handler: SignalHandler) -> Subscription;
}

/// Live subscription to a signal source; unsubscribes on drop
#[must_use = "dropping a Subscription detaches the handler immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detach now
    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

#[derive(Default)]
struct HubInner {
    handlers: DashMap<u64, SignalHandler>,
    next_id: AtomicU64,
}

/// In-process signal source
#[derive(Clone, Default)]
pub struct SignalHub {
    inner: Arc<HubInner>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether at least one handler is attached
    pub fn is_attached(&self) -> bool {
        !self.inner.handlers.is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Deliver a descriptor to every subscriber
    ///
    /// Returns true when someone handled it, i.e. default reporting should be
    /// suppressed.
    pub fn raise(&self, descriptor: ErrorDescriptor) -> bool {
        // Collect first so handlers may (un)subscribe without deadlocking the map
        let handlers: Vec<SignalHandler> = self
            .inner
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        if handlers.is_empty() {
            debug!("No subscribers for {} signal", descriptor.kind);
            return false;
        }

        trace!("Raising {} to {} subscribers", descriptor.kind, handlers.len());
        for handler in handlers {
            handler(descriptor.clone());
        }
        true
    }

    /// Uncaught exception entry point
    ///
    /// Only recorded when an error value accompanies the report; the return
    /// value still claims the error whenever a subscriber is attached.
    pub fn on_error(
        &self,
        message: &str,
        source: Option<&str>,
        line: Option<u32>,
        column: Option<u32>,
        error: Option<serde_json::Value>,
    ) -> bool {
        if let Some(error) = error {
            self.raise(ErrorDescriptor::uncaught(
                message,
                source.map(str::to_string),
                line,
                column,
                error,
            ));
        }
        self.is_attached()
    }

    /// Resource load failure entry point
    ///
    /// Failures whose target has no source URL are not resource failures and
    /// are left alone.
    pub fn on_resource_error(&self, src: Option<&str>, error: serde_json::Value) -> bool {
        match src.filter(|s| !s.is_empty()) {
            Some(src) => self.raise(ErrorDescriptor::resource(src, error)),
            None => false,
        }
    }

    /// Unhandled rejection entry point
    pub fn on_unhandled_rejection(&self, reason: serde_json::Value) -> bool {
        self.raise(ErrorDescriptor::unhandled_rejection(reason))
    }

    /// Spawn a fallible task whose failure nobody else observes
    ///
    /// An `Err` outcome or a panic is raised as an unhandled rejection and
    /// the handle resolves to `None`.
    pub fn watch_task<F, T, E>(&self, future: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let hub = self.clone();
        tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => Some(value),
                Ok(Err(e)) => {
                    hub.on_unhandled_rejection(serde_json::Value::String(e.to_string()));
                    None
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    hub.on_unhandled_rejection(serde_json::Value::String(reason));
                    None
                }
            }
        })
    }
}

impl SignalSource for SignalHub {
    fn subscribe(&self, handler: SignalHandler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.insert(id, handler);
        debug!("Signal subscriber {} attached", id);

        let inner: Weak<HubInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.handlers.remove(&id);
                debug!("Signal subscriber {} detached", id);
            }
        })
    }
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

thread_local! {
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// Run `f` with signal raising suppressed on the current thread
///
/// Monitor callbacks and signal delivery run inside this so that a failure
/// they cause is not fed back into the monitor as a new signal.
pub(crate) fn suppress_signals<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            SUPPRESSED.with(|flag| flag.set(self.0));
        }
    }

    let _restore = Restore(SUPPRESSED.with(|flag| flag.replace(true)));
    f()
}

/// Whether the current thread is inside `suppress_signals`
pub(crate) fn signals_suppressed() -> bool {
    SUPPRESSED.with(|flag| flag.get())
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::descriptor::ErrorKind;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recording_handler() -> (SignalHandler, Arc<Mutex<Vec<ErrorDescriptor>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: SignalHandler = Arc::new(move |d: ErrorDescriptor| sink.lock().push(d));
        (handler, seen)
    }

    #[test]
    fn test_raise_without_subscribers_is_unhandled() {
        let hub = SignalHub::new();
        assert!(!hub.on_unhandled_rejection(json!("x")));
        assert!(!hub.is_attached());
    }

    #[test]
    fn test_subscription_drop_detaches() {
        let hub = SignalHub::new();
        let (handler, seen) = recording_handler();

        let subscription = hub.subscribe(handler);
        assert!(hub.on_unhandled_rejection(json!("first")));
        drop(subscription);
        assert!(!hub.on_unhandled_rejection(json!("second")));

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_on_error_requires_error_value() {
        let hub = SignalHub::new();
        let (handler, seen) = recording_handler();
        let _sub = hub.subscribe(handler);

        // Claimed but not recorded
        assert!(hub.on_error("Script error.", None, None, None, None));
        assert!(seen.lock().is_empty());

        assert!(hub.on_error("boom", Some("app.js"), Some(3), Some(9), Some(json!({}))));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, ErrorKind::Error);
        assert_eq!(seen[0].column, Some(9));
    }

    #[test]
    fn test_resource_error_needs_source() {
        let hub = SignalHub::new();
        let (handler, seen) = recording_handler();
        let _sub = hub.subscribe(handler);

        assert!(!hub.on_resource_error(None, json!(null)));
        assert!(!hub.on_resource_error(Some(""), json!(null)));
        assert!(hub.on_resource_error(Some("/img/logo.png"), json!(null)));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source.as_deref(), Some("/img/logo.png"));
    }

    #[test]
    fn test_every_subscriber_receives_signal() {
        let hub = SignalHub::new();
        let (a, seen_a) = recording_handler();
        let (b, seen_b) = recording_handler();
        let _a = hub.subscribe(a);
        let _b = hub.subscribe(b);

        hub.on_unhandled_rejection(json!("x"));
        assert_eq!(seen_a.lock().len(), 1);
        assert_eq!(seen_b.lock().len(), 1);
    }

    #[test]
    fn test_suppress_signals_restores_flag() {
        assert!(!signals_suppressed());
        suppress_signals(|| {
            assert!(signals_suppressed());
            suppress_signals(|| assert!(signals_suppressed()));
            assert!(signals_suppressed());
        });
        assert!(!signals_suppressed());

        let result = std::panic::catch_unwind(|| suppress_signals(|| panic!("inside")));
        assert!(result.is_err());
        assert!(!signals_suppressed());
    }

    #[tokio::test]
    async fn test_watch_task_reports_err_and_panic() {
        let hub = SignalHub::new();
        let (handler, seen) = recording_handler();
        let _sub = hub.subscribe(handler);

        let ok = hub.watch_task(async { Ok::<_, String>(5) }).await.unwrap();
        assert_eq!(ok, Some(5));

        let failed = hub
            .watch_task(async { Err::<(), _>("db unreachable".to_string()) })
            .await
            .unwrap();
        assert!(failed.is_none());

        let panicked = hub
            .watch_task(async {
                if true {
                    panic!("task exploded");
                }
                Ok::<(), String>(())
            })
            .await
            .unwrap();
        assert!(panicked.is_none());

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].message.as_deref(), Some("db unreachable"));
        assert_eq!(seen[1].kind, ErrorKind::UnhandledRejection);
        assert_eq!(seen[1].message.as_deref(), Some("task exploded"));
    }
}
