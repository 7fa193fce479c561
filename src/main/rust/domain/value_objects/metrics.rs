use std::collections::BTreeMap;

use serde::Serialize;

/// Display-ready aggregate over the current sliding window.
///
/// A `Metrics` value is rebuilt from scratch on every fold and shared behind an
/// `Arc`, so a reader never sees a window that is half updated.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_detections: u64,
    pub compliant_count: u64,
    pub violation_count: u64,
    /// `None` while the window holds no detections
    pub average_confidence: Option<f64>,
    /// Media timestamp (ms) of the oldest event in the window
    pub window_start: Option<u64>,
    /// Media timestamp (ms) of the newest event in the window
    pub window_end: Option<u64>,
    pub events_in_window: usize,
    /// Events per second over the configured window span
    pub event_rate: f64,
    pub class_counts: BTreeMap<String, u64>,
}

impl Metrics {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.total_detections == 0
    }

    /// Whether any object with this label is in the window
    pub fn is_class_present(&self, label: &str) -> bool {
        self.class_counts.get(label).copied().unwrap_or(0) > 0
    }

    /// Share of compliant detections, `None` for an empty window
    pub fn compliance_ratio(&self) -> Option<f64> {
        if self.total_detections == 0 {
            return None;
        }
        Some(self.compliant_count as f64 / self.total_detections as f64)
    }
}
