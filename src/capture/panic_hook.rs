// src/capture/panic_hook.rs
//! Panics as uncaught-exception signals
//!
//! The panic hook is process-global. `PanicHookSource::install` replaces it
//! and the returned guard puts the previous hook back when dropped.
//!
//! Subscribers never run on the panicking thread: a second panic inside a
//! panic hook aborts the process. Each descriptor is delivered on a scoped
//! thread and the hook waits for it. Panics raised by monitor callbacks
//! themselves are not reported again.

use crate::capture::descriptor::ErrorDescriptor;
use crate::capture::signals::{
    panic_message, signals_suppressed, suppress_signals, SignalHandler, SignalHub, SignalSource,
    Subscription,
};
use std::backtrace::Backtrace;
use std::sync::Arc;
use tracing::info;

/// Signal source fed by the process panic hook
#[derive(Debug, Clone, Default)]
pub struct PanicHookSource {
    hub: SignalHub,

    /// Also run the previous hook (usually the stderr printer) for panics a
    /// subscriber already handled
    always_chain: bool,
}

impl PanicHookSource {
    pub fn new(always_chain: bool) -> Self {
        Self {
            hub: SignalHub::new(),
            always_chain,
        }
    }

    /// Replace the process panic hook
    ///
    /// While a subscriber is attached, handled panics skip the previous hook
    /// (default reporting is suppressed) unless `always_chain` is set.
    pub fn install(&self) -> PanicHookGuard {
        let previous = Arc::new(std::panic::take_hook());
        let chained = Arc::clone(&previous);
        let hub = self.hub.clone();
        let always_chain = self.always_chain;

        std::panic::set_hook(Box::new(move |info| {
            if signals_suppressed() {
                (**chained)(info);
                return;
            }

            let message = panic_message(info.payload());
            let (source, line, column) = match info.location() {
                Some(loc) => (Some(loc.file().to_string()), Some(loc.line()), Some(loc.column())),
                None => (None, None, None),
            };

            let descriptor = ErrorDescriptor::uncaught(
                message.clone(),
                source,
                line,
                column,
                serde_json::json!({ "name": "panic", "message": message }),
            )
            .with_stack(Backtrace::force_capture().to_string());

            let handled = std::thread::scope(|scope| {
                std::thread::Builder::new()
                    .name("panic-signal".to_string())
                    .spawn_scoped(scope, || suppress_signals(|| hub.raise(descriptor)))
                    .map(|delivery| delivery.join().unwrap_or(false))
                    .unwrap_or(false)
            });
            if !handled || always_chain {
                (**chained)(info);
            }
        }));

        info!("Panic hook installed");
        PanicHookGuard {
            restore: Some(Box::new(move || {
                let _ = std::panic::take_hook();
                std::panic::set_hook(Box::new(move |info| (**previous)(info)));
            })),
        }
    }
}

impl SignalSource for PanicHookSource {
    fn subscribe(&self, handler: SignalHandler) -> Subscription {
        self.hub.subscribe(handler)
    }
}

/// Restores the previous panic hook on drop
#[must_use = "dropping the guard uninstalls the panic hook"]
pub struct PanicHookGuard {
    restore: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for PanicHookGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}
