// src/main.rs
//! Replay Monitor
//!
//! Reads newline-delimited JSON from stdin, feeds replay events into the
//! retention window and error signals into the capture pipeline, and writes
//! each exported capture to the output directory.
//!
//! ```text
//! {"event": {"timestamp": 1000, "payload": {...}}}
//! {"checkpoint": {"timestamp": 2000, "payload": {...}}}
//! {"error": {"message": "boom", "source": "app.js", "line": 3, "column": 7, "error": {...}}}
//! {"rejection": "network down"}
//! {"resource": {"src": "/img/logo.png"}}
//! ```

use anyhow::{Context, Result};
use replay_monitor::capture::{CaptureSnapshot, SignalHub};
use replay_monitor::observability::{init_metrics, init_tracing, render_metrics};
use replay_monitor::recording::{Emitter, Event};
use replay_monitor::{AppConfig, Monitor, VERSION};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// One line of input
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum InputLine {
    Event(Event),
    Checkpoint(Event),
    Error {
        message: String,
        #[serde(default)]
        source: Option<String>,
        #[serde(default, alias = "lineno")]
        line: Option<u32>,
        #[serde(default, alias = "colno")]
        column: Option<u32>,
        #[serde(default)]
        error: Option<serde_json::Value>,
    },
    Rejection(serde_json::Value),
    Resource {
        #[serde(default)]
        src: Option<String>,
        #[serde(default)]
        error: serde_json::Value,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    if config.observability.metrics {
        init_metrics()?;
    }

    info!("Starting replay-monitor v{}", VERSION);
    debug!("Configuration loaded: {:?}", config);

    std::fs::create_dir_all(&config.output.dir).with_context(|| {
        format!("Failed to create output directory {:?}", config.output.dir)
    })?;

    let hub = SignalHub::new();
    let output_dir = config.output.dir.clone();
    let writes = TaskTracker::new();
    let writer = writes.clone();

    let monitor = Monitor::builder(config.monitor.clone())
        .on_record_error(|descriptor| warn!("Error recorded: {}", descriptor.summary()))
        .on_record_error_events(move |capture| {
            let dir = output_dir.clone();
            writer.spawn(async move {
                match write_capture(&dir, &capture).await {
                    Ok(path) => info!(
                        "Capture {} ({} events) written to {:?}",
                        capture.id,
                        capture.events.len(),
                        path
                    ),
                    Err(e) => error!("Failed to write capture {}: {}", capture.id, e),
                }
            });
        })
        .on_capture_failed(|failure| {
            error!("Capture {} lost during {:?}: {}", failure.id, failure.stage, failure.reason)
        })
        .signal_source(hub.clone())
        .build()?;

    let emitter = monitor.emitter();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let interrupted = loop {
        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => handle_line(&line, &emitter, &hub),
                None => break false,
            },
            _ = &mut ctrl_c => {
                info!("Received shutdown signal, cancelling pending captures");
                break true;
            }
        }
    };

    if !interrupted {
        info!(
            "Input finished, waiting for {} pending captures",
            monitor.capture_stats().pending
        );
        monitor.drain().await;
    }
    monitor.shutdown().await;

    writes.close();
    writes.wait().await;

    let stats = monitor.capture_stats();
    info!(
        "Stopped: {} signals, {} captures exported, {} failed, {} cancelled",
        stats.signals, stats.exported, stats.failed, stats.cancelled
    );

    if let Some(rendered) = render_metrics() {
        info!("Final metrics:\n{}", rendered);
    }

    Ok(())
}

fn handle_line(line: &str, emitter: &Emitter, hub: &SignalHub) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<InputLine>(line) {
        Ok(InputLine::Event(event)) => emitter.emit(event),
        Ok(InputLine::Checkpoint(event)) => emitter.emit_checkpoint(event),
        Ok(InputLine::Error {
            message,
            source,
            line,
            column,
            error,
        }) => {
            hub.on_error(&message, source.as_deref(), line, column, error);
        }
        Ok(InputLine::Rejection(reason)) => {
            hub.on_unhandled_rejection(reason);
        }
        Ok(InputLine::Resource { src, error }) => {
            if !hub.on_resource_error(src.as_deref(), error) {
                debug!("Ignoring resource error without a source");
            }
        }
        Err(e) => warn!("Skipping malformed input line: {}", e),
    }
}

/// Write the capture payload to `<dir>/errorRecord-<id>.json`
async fn write_capture(dir: &Path, capture: &CaptureSnapshot) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("errorRecord-{}.json", capture.id));
    tokio::fs::write(&path, &capture.payload).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_monitor::recording::RetentionBuffer;
    use replay_monitor::{ErrorDescriptor, EvictionMode, MonitorConfig};
    use std::sync::Arc;

    #[test]
    fn test_parse_input_lines() {
        let line: InputLine =
            serde_json::from_str(r#"{"event": {"timestamp": 5, "payload": {"type": 3}}}"#).unwrap();
        assert!(matches!(line, InputLine::Event(ref e) if e.timestamp == 5));

        let line: InputLine = serde_json::from_str(
            r#"{"error": {"message": "boom", "lineno": 3, "colno": 7, "error": {}}}"#,
        )
        .unwrap();
        assert!(matches!(line, InputLine::Error { line: Some(3), column: Some(7), .. }));

        let line: InputLine = serde_json::from_str(r#"{"rejection": "down"}"#).unwrap();
        assert!(matches!(line, InputLine::Rejection(_)));
    }

    #[test]
    fn test_handle_line_routes_events_and_signals() {
        let config = MonitorConfig {
            eviction: EvictionMode::CheckpointSegments,
            ..Default::default()
        };
        let buffer = Arc::new(RetentionBuffer::from_config(&config));
        let emitter = Emitter::new(Arc::clone(&buffer));
        let hub = SignalHub::new();

        handle_line(r#"{"checkpoint": {"timestamp": 0}}"#, &emitter, &hub);
        handle_line(r#"{"event": {"timestamp": 10}}"#, &emitter, &hub);
        handle_line("not json", &emitter, &hub);
        handle_line("", &emitter, &hub);

        let stats = buffer.stats();
        assert_eq!(stats.retained, 2);
        assert_eq!(stats.checkpoints, 1);
    }

    #[tokio::test]
    async fn test_write_capture() {
        let dir = tempfile::tempdir().unwrap();
        let capture = CaptureSnapshot {
            id: ulid::Ulid::new(),
            events: vec![Event::at(1)],
            payload: bytes::Bytes::from_static(br#"[{"timestamp":1,"payload":null}]"#),
            content_type: "application/json",
            descriptor: ErrorDescriptor::unhandled_rejection(serde_json::json!("x")),
            captured_at: chrono::Utc::now(),
        };

        let path = write_capture(dir.path(), &capture).await.unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("errorRecord-"));
        let written: Vec<Event> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, vec![Event::at(1)]);
    }
}
