use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::services::CompliancePolicy;
use crate::domain::value_objects::{DetectedObject, DetectionEvent, Metrics};

/// Tallies of one folded event
struct WindowEntry {
    timestamp: u64,
    objects: u64,
    confidence_sum: f64,
    compliant: u64,
    class_counts: BTreeMap<String, u64>,
}

/// Folds detection events into sliding-window metrics.
///
/// The window is keyed on media timestamps: folding an event evicts every
/// entry that is `window` or more older than the newest timestamp seen.
pub struct StatisticsAggregator {
    window: VecDeque<WindowEntry>,
    span: Duration,
    min_confidence: f32,
    policy: Arc<dyn CompliancePolicy>,
    newest: Option<u64>,
    latest: Arc<Metrics>,
}

impl StatisticsAggregator {
    pub fn new(span: Duration, min_confidence: f32, policy: Arc<dyn CompliancePolicy>) -> Self {
        Self {
            window: VecDeque::new(),
            span,
            min_confidence,
            policy,
            newest: None,
            latest: Arc::new(Metrics::empty()),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.latest.clone()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.newest = None;
        self.latest = Arc::new(Metrics::empty());
    }

    pub fn fold(&mut self, event: &DetectionEvent) -> Arc<Metrics> {
        let kept: Vec<DetectedObject> = event
            .objects
            .iter()
            .filter(|o| !o.confidence.is_nan())
            .map(|o| DetectedObject {
                confidence: o.confidence.clamp(0.0, 1.0),
                ..o.clone()
            })
            .filter(|o| o.confidence >= f64::from(self.min_confidence))
            .collect();

        // a verdict per kept object at most, whatever the policy returns
        let compliant = self
            .policy
            .classify(&kept)
            .into_iter()
            .zip(&kept)
            .filter(|(verdict, _)| *verdict)
            .count() as u64;
        let mut class_counts = BTreeMap::new();
        for object in &kept {
            *class_counts.entry(object.class_label.clone()).or_insert(0) += 1;
        }

        self.window.push_back(WindowEntry {
            timestamp: event.timestamp,
            objects: kept.len() as u64,
            confidence_sum: kept.iter().map(|o| o.confidence).sum(),
            compliant,
            class_counts,
        });

        let newest = self.newest.map_or(event.timestamp, |n| n.max(event.timestamp));
        self.newest = Some(newest);

        let span_ms = self.span.as_millis() as u64;
        self.window
            .retain(|entry| entry.timestamp.saturating_add(span_ms) > newest);

        self.latest = Arc::new(self.rebuild());
        self.latest.clone()
    }

    fn rebuild(&self) -> Metrics {
        let mut metrics = Metrics::empty();
        let mut confidence_sum = 0.0;

        for entry in &self.window {
            metrics.total_detections += entry.objects;
            metrics.compliant_count += entry.compliant;
            confidence_sum += entry.confidence_sum;
            for (label, count) in &entry.class_counts {
                *metrics.class_counts.entry(label.clone()).or_insert(0) += count;
            }
        }

        metrics.violation_count = metrics.total_detections.saturating_sub(metrics.compliant_count);
        if metrics.total_detections > 0 {
            metrics.average_confidence = Some(confidence_sum / metrics.total_detections as f64);
        }
        metrics.window_start = self.window.iter().map(|e| e.timestamp).min();
        metrics.window_end = self.window.iter().map(|e| e.timestamp).max();
        metrics.events_in_window = self.window.len();
        metrics.event_rate = self.window.len() as f64 / self.span.as_secs_f64();

        metrics
    }
}
