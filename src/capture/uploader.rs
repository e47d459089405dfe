// src/capture/uploader.rs
//! Upload of captured payloads to remote storage
//!
//! `HttpUploader` performs a two-step presigned upload:
//!
//! ```text
//! POST presign_url {bizId, fileSize, fileName}
//!      ◄── {success, data: {uploadUrl, readUrl}}
//! PUT  uploadUrl  <payload>   (Content-Disposition: attachment;filename=...)
//!      ◄── 200  ⇒  readUrl
//! ```
//!
//! Plain HTTP only; TLS termination is expected in front of the storage
//! endpoint.

use crate::utils::errors::{MonitorError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info, warn};

/// A named payload to upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Byte sink that returns a URL the payload can be read back from
pub trait EventUploader: Send + Sync {
    fn upload(&self, file: UploadFile) -> BoxFuture<'_, Result<String>>;
}

impl<F, Fut> EventUploader for F
where
    F: Fn(UploadFile) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    fn upload(&self, file: UploadFile) -> BoxFuture<'_, Result<String>> {
        Box::pin(self(file))
    }
}

/// Settings for `HttpUploader`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpUploaderConfig {
    /// Endpoint that hands out upload/read URL pairs
    pub presign_url: String,

    /// Business identifier sent with each presign request
    pub biz_id: String,

    /// Extra headers for the presign request
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignRequest<'a> {
    biz_id: &'a str,
    file_size: usize,
    file_name: &'a str,
}

#[derive(Deserialize)]
struct PresignResponse {
    success: bool,
    #[serde(default)]
    data: Option<PresignedUpload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignedUpload {
    upload_url: String,
    read_url: String,
}

/// Presigned-URL uploader over HTTP/1.1
pub struct HttpUploader {
    config: HttpUploaderConfig,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpUploader {
    pub fn new(config: HttpUploaderConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { config, client }
    }

    async fn presign(&self, file: &UploadFile) -> Result<PresignedUpload> {
        let body = serde_json::to_vec(&PresignRequest {
            biz_id: &self.config.biz_id,
            file_size: file.size(),
            file_name: &file.name,
        })?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.config.presign_url.as_str())
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in &self.config.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| MonitorError::UploadFailed(format!("Request build error: {}", e)))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| MonitorError::UploadFailed(format!("Presign request failed: {}", e)))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| MonitorError::UploadFailed(format!("Presign body error: {}", e)))?
            .to_bytes();

        if !status.is_success() {
            return Err(MonitorError::UploadFailed(format!(
                "Presign endpoint returned {}",
                status
            )));
        }

        let parsed: PresignResponse = serde_json::from_slice(&bytes).map_err(|e| {
            MonitorError::UploadFailed(format!("Malformed presign response: {}", e))
        })?;

        match (parsed.success, parsed.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(MonitorError::UploadFailed(
                "Presign endpoint did not grant an upload".to_string(),
            )),
        }
    }

    async fn put(&self, upload_url: &str, file: UploadFile) -> Result<()> {
        let request = Request::builder()
            .method(Method::PUT)
            .uri(upload_url)
            .header(CONTENT_TYPE, file.content_type.as_str())
            .header(
                CONTENT_DISPOSITION,
                format!("attachment;filename={}", encode_component(&file.name)),
            )
            .body(Full::new(file.bytes))
            .map_err(|e| MonitorError::UploadFailed(format!("Request build error: {}", e)))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| MonitorError::UploadFailed(format!("Upload request failed: {}", e)))?;

        if response.status() != StatusCode::OK {
            warn!("Storage rejected upload with {}", response.status());
            return Err(MonitorError::UploadFailed(format!(
                "Storage returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl EventUploader for HttpUploader {
    fn upload(&self, file: UploadFile) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            debug!("Uploading {} ({} bytes)", file.name, file.size());
            let presigned = self.presign(&file).await?;
            self.put(&presigned.upload_url, file).await?;
            info!("Capture uploaded, readable at {}", presigned.read_url);
            Ok(presigned.read_url)
        })
    }
}

/// Everything but the URI-component unreserved marks gets percent-encoded
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub(crate) fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}
