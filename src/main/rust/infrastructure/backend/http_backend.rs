use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::ndjson::NdjsonDecoder;
use crate::domain::errors::{TransportError, UploadError, UploadRejection};
use crate::domain::ports::{FrameStream, InferenceBackend, StreamTarget, StreamTicket};
use crate::domain::value_objects::{DetectionEvent, UploadedFile};

const NDJSON: &str = "application/x-ndjson";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadReply {
    stream_id: Option<String>,
    error: Option<String>,
}

/// Inference backend reached over HTTP.
///
/// Uploads go to `POST /api/upload`; detection events are read as NDJSON from
/// `/api/video-stream/{id}/events` (processed files) or
/// `/api/webcam-stream/events?device=` (live devices).
#[derive(Debug, Clone)]
pub struct HttpInferenceBackend {
    client: Client,
    base_url: String,
}

impl HttpInferenceBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn upload(&self, file: &UploadedFile) -> Result<StreamTicket, UploadError> {
        let media = tokio::fs::File::open(&file.path).await?;
        let length = media.metadata().await?.len();
        info!(name = %file.name, bytes = length, "Uploading video");

        let response = self
            .client
            .post(self.url("/api/upload"))
            .header(CONTENT_TYPE, file.mime_type.as_str())
            .header(CONTENT_LENGTH, length)
            .header("X-File-Name", file.name.as_str())
            .body(Body::wrap_stream(ReaderStream::new(media)))
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let reply: UploadReply = response
            .json()
            .await
            .map_err(|e| UploadError::Transport(format!("status {}: {}", status, e)))?;

        match reply {
            UploadReply {
                error: Some(code), ..
            } => Err(UploadError::Rejected(UploadRejection::from_code(&code))),
            UploadReply {
                stream_id: Some(stream_id),
                ..
            } if status.is_success() => {
                debug!(%stream_id, "Upload acknowledged");
                Ok(StreamTicket { stream_id })
            }
            _ => Err(UploadError::Transport(format!(
                "unexpected upload reply with status {}",
                status
            ))),
        }
    }

    async fn open_stream(
        &self,
        target: &StreamTarget,
    ) -> Result<Box<dyn FrameStream>, TransportError> {
        let request = match target {
            StreamTarget::Processed { stream_id } => self
                .client
                .get(self.url(&format!("/api/video-stream/{}/events", stream_id))),
            StreamTarget::Live { device_id } => self
                .client
                .get(self.url("/api/webcam-stream/events"))
                .query(&[("device", device_id.as_str())]),
        };

        let response = request
            .header(ACCEPT, NDJSON)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|e| e.to_string()))
            .boxed();
        Ok(Box::new(NdjsonFrameStream::new(body)))
    }
}

/// Detection events decoded from a chunked response body
pub struct NdjsonFrameStream {
    body: BoxStream<'static, Result<Vec<u8>, String>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<DetectionEvent>,
    finished: bool,
}

impl NdjsonFrameStream {
    pub fn new(body: BoxStream<'static, Result<Vec<u8>, String>>) -> Self {
        Self {
            body,
            decoder: NdjsonDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

#[async_trait]
impl FrameStream for NdjsonFrameStream {
    async fn next_event(&mut self) -> Result<Option<DetectionEvent>, TransportError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.push(&chunk)?),
                Some(Err(e)) => return Err(TransportError::Interrupted(e)),
                None => {
                    self.finished = true;
                    self.pending.extend(self.decoder.finish());
                }
            }
        }
    }
}
