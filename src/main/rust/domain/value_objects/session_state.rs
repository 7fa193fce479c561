use std::fmt;

use serde::Serialize;

use crate::domain::errors::FailureReason;

/// Detection session states (pure domain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No session
    Idle,
    /// Checking the media source
    Validating,
    /// Upload handshake or stream connect in progress
    Connecting,
    /// Receiving detection events
    Active,
    /// Stream went quiet, may still recover
    Degraded,
    /// Closing the stream connection
    Stopping,
    /// Session ended with an error, waiting for acknowledgement
    Failed { reason: FailureReason },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Validating => write!(f, "VALIDATING"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Failed { reason } => write!(f, "FAILED ({})", reason),
        }
    }
}

impl SessionState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Validating => 1.0,
            Self::Connecting => 2.0,
            Self::Active => 3.0,
            Self::Degraded => 4.0,
            Self::Stopping => 5.0,
            Self::Failed { .. } => 6.0,
        }
    }

    /// States in which a stream connection is open
    pub fn holds_connection(&self) -> bool {
        matches!(self, Self::Connecting | Self::Active | Self::Degraded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Failed { reason } => Some(*reason),
            _ => None,
        }
    }

    /// Legal edges of the session state machine.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle, Validating) => true,
            (Validating, Connecting) | (Validating, Idle) => true,
            (Connecting, Active) | (Connecting, Stopping) => true,
            (Active, Degraded) | (Degraded, Active) => true,
            (Active, Stopping) | (Degraded, Stopping) => true,
            (Stopping, Idle) => true,
            (Failed { .. }, Idle) => true,
            // Any session-holding state can fail; Stopping never fails, it always ends in Idle.
            (Validating | Connecting | Active | Degraded, Failed { .. }) => true,
            _ => false,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}
