use async_trait::async_trait;

use crate::domain::errors::{TransportError, UploadError};
use crate::domain::value_objects::{DetectionEvent, UploadedFile};

/// Identifier the backend hands out for an uploaded video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTicket {
    pub stream_id: String,
}

/// What a detection stream is opened against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    /// Processed stream of a previously uploaded file
    Processed { stream_id: String },
    /// Continuous inference on a capture device
    Live { device_id: String },
}

/// Port for the backend that runs inference
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Transfer the media and wait for the backend to acknowledge it
    async fn upload(&self, file: &UploadedFile) -> Result<StreamTicket, UploadError>;

    async fn open_stream(&self, target: &StreamTarget)
        -> Result<Box<dyn FrameStream>, TransportError>;
}

/// An open detection stream. Dropping it releases the transport.
#[async_trait]
pub trait FrameStream: Send {
    /// Next event; `Ok(None)` once the backend finished the stream
    async fn next_event(&mut self) -> Result<Option<DetectionEvent>, TransportError>;
}
