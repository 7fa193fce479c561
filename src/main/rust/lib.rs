pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    DetectionSessionManager, MediaSourceValidator, SessionUpdate, StatisticsAggregator,
    StreamConnection, Subscription, SubscriptionHandle, UpdateKind,
};
pub use config::Config;
pub use domain::entities::{Session, SessionId, SessionLifecycle, StateTransition};
pub use domain::errors::{DomainError, FailureReason, Result};
pub use domain::ports::{DeviceAccess, FrameStream, InferenceBackend, MetricsReporter};
pub use domain::services::{CompliancePolicy, GroupingMode, RequiredPpePolicy};
pub use domain::value_objects::{
    DetectionEvent, MediaCandidate, MediaSource, Metrics, PpeClass, SessionConfig, SessionState,
};
pub use infrastructure::backend::HttpInferenceBackend;
pub use infrastructure::devices::LocalDeviceAccess;
pub use infrastructure::metrics::{serve_status, PrometheusReporter};
