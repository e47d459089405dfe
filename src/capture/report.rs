// src/capture/report.rs
//! Manual capture-and-report flow
//!
//! Unlike automatic captures, this flow is awaited by its caller and every
//! failure propagates: missing uploader, serialization, upload.

use crate::capture::uploader::{EventUploader, UploadFile};
use crate::observability::metrics as m;
use crate::recording::exporter::CaptureSerializer;
use crate::recording::retention::RetentionBuffer;
use crate::utils::errors::{MonitorError, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Build the link that opens an uploaded capture in the replay viewer
pub fn preview_url(preview_base_url: &str, uploaded_url: &str) -> String {
    format!("{}?url={}", preview_base_url, uploaded_url)
}

/// Packages the current window and hands a preview link to the caller
pub struct Reporter {
    buffer: Arc<RetentionBuffer>,
    serializer: Arc<dyn CaptureSerializer>,
    uploader: Option<Arc<dyn EventUploader>>,
    delay: Duration,
    preview_base_url: String,
}

impl Reporter {
    pub fn new(
        buffer: Arc<RetentionBuffer>,
        serializer: Arc<dyn CaptureSerializer>,
        uploader: Option<Arc<dyn EventUploader>>,
        delay: Duration,
        preview_base_url: impl Into<String>,
    ) -> Self {
        Self {
            buffer,
            serializer,
            uploader,
            delay,
            preview_base_url: preview_base_url.into(),
        }
    }

    pub fn has_uploader(&self) -> bool {
        self.uploader.is_some()
    }

    /// Wait the capture delay, upload the window, then await `continuation`
    /// with the preview URL
    ///
    /// Fails immediately, before waiting or serializing, when no uploader is
    /// configured.
    pub async fn capture_and_report<F, Fut, T>(&self, continuation: F) -> Result<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let uploader = self
            .uploader
            .as_ref()
            .ok_or(MonitorError::MissingCollaborator("uploader"))?;

        tokio::time::sleep(self.delay).await;

        let events = self.buffer.snapshot();
        let payload = self.serializer.serialize(&events)?;
        let file = UploadFile::new(
            format!("errorRecord-{}.json", Utc::now().timestamp_millis()),
            self.serializer.content_type(),
            payload,
        );
        debug!("Reporting {} events as {}", events.len(), file.name);

        let uploaded = uploader.upload(file).await?;
        if uploaded.is_empty() {
            return Err(MonitorError::UploadFailed(
                "uploader returned an empty URL".to_string(),
            ));
        }
        metrics::counter!(m::REPORTS_UPLOADED).increment(1);

        let preview = preview_url(&self.preview_base_url, &uploaded);
        info!("Capture report available at {}", preview);
        Ok(continuation(preview).await)
    }
}
