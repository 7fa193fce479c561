use crate::domain::errors::FailureReason;
use crate::domain::value_objects::{Metrics, SessionState, SourceKind};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_state_change(&self, state: &SessionState);
    fn report_session_started(&self, kind: SourceKind);
    fn report_failure(&self, reason: FailureReason);
    fn report_window(&self, metrics: &Metrics);
    fn report_detections(&self, count: u64);
    fn report_out_of_order(&self);
    fn report_uptime(&self, uptime_secs: f64);
}
