mod backoff_policy;
mod connection_health;
mod detection_event;
mod media_source;
mod metrics;
mod ppe_class;
mod session_config;
mod session_state;

pub use backoff_policy::BackoffPolicy;
pub use connection_health::{CloseReason, ConnectionHealth, HealthChange, HealthStatus};
pub use detection_event::{BoundingBox, DetectedObject, DetectionEvent, FrameRef, SequencedEvent};
pub use media_source::{LiveDevice, MediaCandidate, MediaSource, SourceKind, UploadedFile};
pub use metrics::Metrics;
pub use ppe_class::PpeClass;
pub use session_config::SessionConfig;
pub use session_state::SessionState;
