use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::value_objects::{CloseReason, SessionState};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid duration for {0}: must be greater than zero")]
    InvalidDuration(&'static str),

    #[error("Invalid backoff multiplier: must be > 1.0")]
    InvalidBackoffMultiplier,

    #[error("Invalid reorder window: capacity must be greater than zero")]
    InvalidReorderCapacity,

    #[error("Invalid minimum confidence {0}: must be within [0, 1]")]
    InvalidMinConfidence(f32),

    #[error("Invalid proximity distance {0}: must be positive")]
    InvalidProximityDistance(f32),

    #[error("Invalid channel capacity: must be greater than zero")]
    InvalidChannelCapacity,

    #[error("Illegal state transition from {from} to {to}")]
    IllegalTransition { from: SessionState, to: SessionState },

    #[error("Session manager is no longer running")]
    ManagerClosed,
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Rejection produced by the media source validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Error codes the backend answers an upload handshake with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadRejection {
    InvalidMediaType,
    FileTooLarge,
    Unsupported,
}

impl UploadRejection {
    pub fn from_code(code: &str) -> Self {
        match code {
            "InvalidMediaType" => Self::InvalidMediaType,
            "FileTooLarge" => Self::FileTooLarge,
            _ => Self::Unsupported,
        }
    }
}

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMediaType => write!(f, "InvalidMediaType"),
            Self::FileTooLarge => write!(f, "FileTooLarge"),
            Self::Unsupported => write!(f, "Unsupported"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload rejected by backend: {0}")]
    Rejected(UploadRejection),

    #[error("Upload transport failed: {0}")]
    Transport(String),

    #[error("Failed to read media: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Stream endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Stream endpoint answered with status {0}")]
    Status(u16),

    #[error("Stream interrupted: {0}")]
    Interrupted(String),

    #[error("Stream line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// Broad class of a failure, used to decide whether retrying makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    Validation,
    Connection,
    Internal,
}

/// Stable reason code carried by the `Failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    InvalidMediaType,
    FileTooLarge,
    DeviceUnavailable,
    UploadFailed,
    Timeout,
    TransportClosed,
    Internal,
}

impl FailureReason {
    pub const ALL: [FailureReason; 7] = [
        Self::InvalidMediaType,
        Self::FileTooLarge,
        Self::DeviceUnavailable,
        Self::UploadFailed,
        Self::Timeout,
        Self::TransportClosed,
        Self::Internal,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMediaType => "INVALID_MEDIA_TYPE",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::DeviceUnavailable => "DEVICE_UNAVAILABLE",
            Self::UploadFailed => "UPLOAD_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::TransportClosed => "TRANSPORT_CLOSED",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidMediaType | Self::FileTooLarge | Self::DeviceUnavailable => {
                ErrorCategory::Validation
            }
            Self::UploadFailed | Self::Timeout | Self::TransportClosed => ErrorCategory::Connection,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Validation failures need a new source; connection failures can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<&ValidationError> for FailureReason {
    fn from(err: &ValidationError) -> Self {
        match err {
            ValidationError::InvalidMediaType(_) => Self::InvalidMediaType,
            ValidationError::FileTooLarge { .. } => Self::FileTooLarge,
            ValidationError::DeviceUnavailable(_) => Self::DeviceUnavailable,
        }
    }
}

impl From<CloseReason> for FailureReason {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::UploadFailed => Self::UploadFailed,
            CloseReason::Timeout => Self::Timeout,
            CloseReason::TransportClosed | CloseReason::EndOfStream => Self::TransportClosed,
            CloseReason::UserStopped => Self::Internal,
        }
    }
}
