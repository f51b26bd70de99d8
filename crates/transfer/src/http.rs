//! Multipart upload over HTTP.
//!
//! `POST {base}/projects/{id}/ifc-files` with the file in the `file` field
//! and an optional bearer token.

use std::future::Future;
use std::pin::Pin;

use aecaxis_protocol::FileDescriptor;
use aecaxis_protocol::constants::{UPLOAD_FIELD, UPLOAD_TIMEOUT};
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::TransferError;
use crate::classify::TransportOutcome;
use crate::uploader::{ByteProgress, UploadRequest, Uploader};

const READ_CHUNK: usize = 64 * 1024;

/// [`Uploader`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUploader {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, TransferError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| TransferError::InvalidToken)?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(UPLOAD_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self, project_id: &str) -> String {
        format!("{}/projects/{}/ifc-files", self.base_url, project_id)
    }

    async fn send(
        &self,
        request: UploadRequest<'_>,
        progress: mpsc::Sender<ByteProgress>,
    ) -> Result<FileDescriptor, TransportOutcome> {
        let file = request.file;
        let total = file.size();
        let handle = tokio::fs::File::open(file.path())
            .await
            .map_err(|e| TransportOutcome::Other(format!("open {}: {e}", file.path().display())))?;

        let mut loaded = 0u64;
        let stream = ReaderStream::with_capacity(handle, READ_CHUNK).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                loaded += bytes.len() as u64;
                // A full channel only means the consumer is behind; the next
                // update carries the cumulative count.
                let _ = progress.try_send(ByteProgress { loaded, total });
            }
            chunk
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(file.name().to_string())
            .mime_str("application/octet-stream")
            .map_err(transport_error)?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let url = self.endpoint(request.project_id);
        debug!(%url, size = total, "sending upload");
        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportOutcome::Status {
                code: status.as_u16(),
                detail: error_detail(&body)
                    .or_else(|| status.canonical_reason().map(str::to_string)),
            });
        }

        let descriptor = resp
            .json::<FileDescriptor>()
            .await
            .map_err(|e| TransportOutcome::Other(format!("invalid upload response: {e}")))?;
        info!(id = %descriptor.id, file = %descriptor.filename, "upload accepted");
        Ok(descriptor)
    }
}

impl Uploader for HttpUploader {
    fn upload<'a>(
        &'a self,
        request: UploadRequest<'a>,
        progress: mpsc::Sender<ByteProgress>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<FileDescriptor, TransportOutcome>> + Send + 'a>> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportOutcome::Aborted),
                res = self.send(request, progress) => res,
            }
        })
    }
}

fn transport_error(e: reqwest::Error) -> TransportOutcome {
    if e.is_timeout() {
        TransportOutcome::TimedOut
    } else if e.is_connect() {
        TransportOutcome::Offline(e.to_string())
    } else {
        TransportOutcome::Other(e.to_string())
    }
}

/// Pulls `detail` out of an error body, falling back to the raw text.
fn error_detail(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(body.to_string()),
        },
        _ => Some(body.to_string()),
    }
}
