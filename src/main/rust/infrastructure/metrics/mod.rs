mod prometheus_reporter;
mod status_server;

pub use prometheus_reporter::PrometheusReporter;
pub use status_server::{serve_status, status_routes};
