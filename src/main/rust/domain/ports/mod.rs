mod device_access;
mod inference_backend;
mod metrics_reporter;

pub use device_access::{DeviceAccess, PermissionOutcome};
pub use inference_backend::{FrameStream, InferenceBackend, StreamTarget, StreamTicket};
pub use metrics_reporter::MetricsReporter;
