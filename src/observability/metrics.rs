// src/observability/metrics.rs
//! Metric names and the Prometheus recorder

use crate::utils::errors::{MonitorError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const EVENTS_INGESTED: &str = "replay_monitor_events_ingested_total";
pub const EVENTS_EVICTED: &str = "replay_monitor_events_evicted_total";
pub const RETAINED_EVENTS: &str = "replay_monitor_retained_events";
pub const SIGNALS: &str = "replay_monitor_signals_total";
pub const CAPTURES_SCHEDULED: &str = "replay_monitor_captures_scheduled_total";
pub const CAPTURES_EXPORTED: &str = "replay_monitor_captures_exported_total";
pub const CAPTURES_FAILED: &str = "replay_monitor_captures_failed_total";
pub const CAPTURES_CANCELLED: &str = "replay_monitor_captures_cancelled_total";
pub const REPORTS_UPLOADED: &str = "replay_monitor_reports_uploaded_total";

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder as the global `metrics` recorder
///
/// Calling it again after a successful install is a no-op.
pub fn init_metrics() -> Result<()> {
    PROMETHEUS
        .get_or_try_init(|| {
            PrometheusBuilder::new().install_recorder().map_err(|e| {
                MonitorError::ConfigError(format!("Failed to install metrics recorder: {}", e))
            })
        })
        .map(|_| ())
}

/// Current metrics in Prometheus text format, if the recorder is installed
pub fn render_metrics() -> Option<String> {
    PROMETHEUS.get().map(|handle| handle.render())
}
