// tests/panic_hook.rs
//! The panic hook is process-global: these tests live in their own binary
//! and take turns installing it.

use parking_lot::{const_mutex, Mutex};
use replay_monitor::capture::{PanicHookSource, SignalHub, SignalSource};
use replay_monitor::{ErrorDescriptor, ErrorKind, Monitor, MonitorConfig};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

static HOOK: Mutex<()> = const_mutex(());

#[test]
fn test_panic_becomes_uncaught_error_signal() {
    let _serial = HOOK.lock();
    let source = PanicHookSource::new(false);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = source.subscribe(Arc::new(move |d: ErrorDescriptor| sink.lock().push(d)));

    let guard = source.install();
    let result = std::panic::catch_unwind(|| {
        panic!("render failed");
    });
    drop(guard);
    drop(subscription);

    assert!(result.is_err());
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);

    let descriptor = &seen[0];
    assert_eq!(descriptor.kind, ErrorKind::Error);
    assert_eq!(descriptor.message.as_deref(), Some("render failed"));
    assert!(descriptor
        .source
        .as_deref()
        .is_some_and(|file| file.ends_with("panic_hook.rs")));
    assert!(descriptor.line.is_some());
    assert!(descriptor.stack.is_some());
    assert_eq!(descriptor.error["name"], "panic");
}

#[test]
fn test_panicking_subscriber_is_contained() {
    let _serial = HOOK.lock();
    let source = PanicHookSource::new(false);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _subscription = source.subscribe(Arc::new(move |_: ErrorDescriptor| {
        counter.fetch_add(1, Ordering::SeqCst);
        panic!("subscriber broke");
    }));

    let guard = source.install();
    let result = std::panic::catch_unwind(|| {
        panic!("render failed");
    });
    drop(guard);

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_notifier_is_not_reported_again() {
    let _serial = HOOK.lock();
    let panics = PanicHookSource::new(false);
    let hub = SignalHub::new();
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);

    let monitor = Monitor::builder(MonitorConfig::default())
        .on_record_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("notifier broke");
        })
        .signal_source(hub.clone())
        .signal_source(panics.clone())
        .build()
        .unwrap();
    let _guard = panics.install();

    assert!(hub.on_unhandled_rejection(json!("boom")));

    // A genuine panic still reaches the notifier exactly once
    let result = std::panic::catch_unwind(|| {
        panic!("render failed");
    });
    assert!(result.is_err());

    assert_eq!(notified.load(Ordering::SeqCst), 2);
    assert_eq!(monitor.capture_stats().signals, 2);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_export_callback_does_not_feed_back() {
    let _serial = HOOK.lock();
    let panics = PanicHookSource::new(false);
    let hub = SignalHub::new();
    let config = MonitorConfig {
        delay_record_time_ms: 10,
        ..Default::default()
    };

    let monitor = Monitor::builder(config)
        .on_record_error_events(|_| panic!("export broke"))
        .signal_source(hub.clone())
        .signal_source(panics.clone())
        .build()
        .unwrap();
    let _guard = panics.install();

    hub.on_unhandled_rejection(json!("boom"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.drain().await;

    let stats = monitor.capture_stats();
    assert_eq!(stats.signals, 1);
    assert_eq!(stats.scheduled, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
}
