use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::errors::FailureReason;
use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{Metrics, SessionState, SourceKind};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Session state (0=Idle, 1=Validating, 2=Connecting, 3=Active, 4=Degraded, 5=Stopping, 6=Failed)
    pub static ref SESSION_STATE: Gauge = Gauge::new(
        "ppe_session_state",
        "Current detection session state"
    ).expect("metric can be created");

    pub static ref SESSIONS_STARTED: IntCounterVec = IntCounterVec::new(
        Opts::new("ppe_sessions_started_total", "Sessions that passed validation"),
        &["source"]
    ).expect("metric can be created");

    pub static ref SESSION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("ppe_session_failures_total", "Sessions that ended in Failed"),
        &["reason"]
    ).expect("metric can be created");

    pub static ref DETECTIONS_TOTAL: IntCounter = IntCounter::new(
        "ppe_detections_total",
        "Detected objects received from the backend"
    ).expect("metric can be created");

    pub static ref WINDOW_COMPLIANT: IntGauge = IntGauge::new(
        "ppe_window_compliant",
        "Compliant detections in the current window"
    ).expect("metric can be created");

    pub static ref WINDOW_VIOLATIONS: IntGauge = IntGauge::new(
        "ppe_window_violations",
        "Violations in the current window"
    ).expect("metric can be created");

    // NaN while the window is empty
    pub static ref WINDOW_AVERAGE_CONFIDENCE: Gauge = Gauge::new(
        "ppe_window_average_confidence",
        "Mean confidence of detections in the current window"
    ).expect("metric can be created");

    pub static ref WINDOW_EVENT_RATE: Gauge = Gauge::new(
        "ppe_window_event_rate",
        "Detection events per second over the current window"
    ).expect("metric can be created");

    pub static ref OUT_OF_ORDER_EVENTS: IntCounter = IntCounter::new(
        "ppe_out_of_order_events_total",
        "Events delivered behind a later timestamp"
    ).expect("metric can be created");

    pub static ref SESSION_UPTIME: Gauge = Gauge::new(
        "ppe_session_uptime_seconds",
        "Time since the current session started"
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(SESSION_STATE.clone()))?;
        REGISTRY.register(Box::new(SESSIONS_STARTED.clone()))?;
        REGISTRY.register(Box::new(SESSION_FAILURES.clone()))?;
        REGISTRY.register(Box::new(DETECTIONS_TOTAL.clone()))?;
        REGISTRY.register(Box::new(WINDOW_COMPLIANT.clone()))?;
        REGISTRY.register(Box::new(WINDOW_VIOLATIONS.clone()))?;
        REGISTRY.register(Box::new(WINDOW_AVERAGE_CONFIDENCE.clone()))?;
        REGISTRY.register(Box::new(WINDOW_EVENT_RATE.clone()))?;
        REGISTRY.register(Box::new(OUT_OF_ORDER_EVENTS.clone()))?;
        REGISTRY.register(Box::new(SESSION_UPTIME.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_state_change(&self, state: &SessionState) {
        SESSION_STATE.set(state.as_metric());
    }

    fn report_session_started(&self, kind: SourceKind) {
        SESSIONS_STARTED.with_label_values(&[kind.label()]).inc();
    }

    fn report_failure(&self, reason: FailureReason) {
        SESSION_FAILURES.with_label_values(&[reason.code()]).inc();
    }

    fn report_window(&self, metrics: &Metrics) {
        WINDOW_COMPLIANT.set(metrics.compliant_count as i64);
        WINDOW_VIOLATIONS.set(metrics.violation_count as i64);
        WINDOW_AVERAGE_CONFIDENCE.set(metrics.average_confidence.unwrap_or(f64::NAN));
        WINDOW_EVENT_RATE.set(metrics.event_rate);
    }

    fn report_detections(&self, count: u64) {
        DETECTIONS_TOTAL.inc_by(count);
    }

    fn report_out_of_order(&self) {
        OUT_OF_ORDER_EVENTS.inc();
    }

    fn report_uptime(&self, uptime_secs: f64) {
        SESSION_UPTIME.set(uptime_secs);
    }
}
