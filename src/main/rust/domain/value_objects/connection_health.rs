use std::fmt;
use std::time::SystemTime;

use serde::Serialize;

/// Liveness of the backend stream as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Connecting,
    Live,
    Degraded,
    Closed,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Live => write!(f, "LIVE"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a stream connection reached `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    UserStopped,
    UploadFailed,
    Timeout,
    TransportClosed,
    /// The processed file has no more frames
    EndOfStream,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserStopped => write!(f, "USER_STOPPED"),
            Self::UploadFailed => write!(f, "UPLOAD_FAILED"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::TransportClosed => write!(f, "TRANSPORT_CLOSED"),
            Self::EndOfStream => write!(f, "END_OF_STREAM"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHealth {
    pub status: HealthStatus,
    pub last_event_at: Option<SystemTime>,
}

impl ConnectionHealth {
    pub fn connecting() -> Self {
        Self {
            status: HealthStatus::Connecting,
            last_event_at: None,
        }
    }

    pub fn with_status(self, status: HealthStatus) -> Self {
        Self { status, ..self }
    }
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self::connecting()
    }
}

/// Health update emitted by a stream connection
#[derive(Debug, Clone, PartialEq)]
pub struct HealthChange {
    pub health: ConnectionHealth,
    /// Set only on the terminal `Closed` change
    pub reason: Option<CloseReason>,
    pub detail: Option<String>,
}

impl HealthChange {
    pub fn status(health: ConnectionHealth) -> Self {
        Self {
            health,
            reason: None,
            detail: None,
        }
    }

    pub fn closed(
        last_event_at: Option<SystemTime>,
        reason: CloseReason,
        detail: Option<String>,
    ) -> Self {
        Self {
            health: ConnectionHealth {
                status: HealthStatus::Closed,
                last_event_at,
            },
            reason: Some(reason),
            detail,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.health.status == HealthStatus::Closed
    }
}
