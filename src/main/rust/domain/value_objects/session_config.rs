use std::collections::BTreeSet;
use std::time::Duration;

use crate::domain::errors::{DomainError, Result};
use crate::domain::services::GroupingMode;
use crate::domain::value_objects::{BackoffPolicy, PpeClass};

const DEFAULT_LIVENESS_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RECONNECT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_AGGREGATION_WINDOW_MS: u64 = 2_000;
const DEFAULT_STOP_GRACE_MS: u64 = 3_000;
const DEFAULT_REORDER_CAPACITY: usize = 8;
const DEFAULT_REORDER_MAX_DELAY_MS: u64 = 150;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tuning of one detection session manager
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    liveness_timeout: Duration,
    reconnect_timeout: Duration,
    aggregation_window: Duration,
    required_ppe_classes: BTreeSet<String>,
    file_size_limit_bytes: Option<u64>,
    stop_grace_period: Duration,
    reorder_capacity: usize,
    reorder_max_delay: Duration,
    min_confidence: f32,
    grouping: GroupingMode,
    backoff: BackoffPolicy,
    event_channel_capacity: usize,
}

impl SessionConfig {
    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    pub fn with_aggregation_window(mut self, window: Duration) -> Self {
        self.aggregation_window = window;
        self
    }

    pub fn with_required_ppe_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_ppe_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_file_size_limit(mut self, limit_bytes: Option<u64>) -> Self {
        self.file_size_limit_bytes = limit_bytes;
        self
    }

    pub fn with_stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace_period = grace;
        self
    }

    pub fn with_reorder_window(mut self, capacity: usize, max_delay: Duration) -> Self {
        self.reorder_capacity = capacity;
        self.reorder_max_delay = max_delay;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_grouping(mut self, grouping: GroupingMode) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn liveness_timeout(&self) -> Duration {
        self.liveness_timeout
    }

    pub fn reconnect_timeout(&self) -> Duration {
        self.reconnect_timeout
    }

    pub fn aggregation_window(&self) -> Duration {
        self.aggregation_window
    }

    pub fn required_ppe_classes(&self) -> &BTreeSet<String> {
        &self.required_ppe_classes
    }

    pub fn file_size_limit_bytes(&self) -> Option<u64> {
        self.file_size_limit_bytes
    }

    pub fn stop_grace_period(&self) -> Duration {
        self.stop_grace_period
    }

    pub fn reorder_capacity(&self) -> usize {
        self.reorder_capacity
    }

    pub fn reorder_max_delay(&self) -> Duration {
        self.reorder_max_delay
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn grouping(&self) -> GroupingMode {
        self.grouping
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn event_channel_capacity(&self) -> usize {
        self.event_channel_capacity
    }

    pub fn validate(&self) -> Result<()> {
        Self::require_positive(self.liveness_timeout, "liveness timeout")?;
        Self::require_positive(self.reconnect_timeout, "reconnect timeout")?;
        Self::require_positive(self.aggregation_window, "aggregation window")?;
        Self::require_positive(self.stop_grace_period, "stop grace period")?;

        if self.reorder_capacity == 0 {
            return Err(DomainError::InvalidReorderCapacity);
        }

        if self.event_channel_capacity == 0 {
            return Err(DomainError::InvalidChannelCapacity);
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(DomainError::InvalidMinConfidence(self.min_confidence));
        }

        if let GroupingMode::Proximity { max_center_distance } = self.grouping {
            if !(max_center_distance > 0.0) {
                return Err(DomainError::InvalidProximityDistance(max_center_distance));
            }
        }

        Ok(())
    }

    fn require_positive(value: Duration, name: &'static str) -> Result<()> {
        if value.is_zero() {
            return Err(DomainError::InvalidDuration(name));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            liveness_timeout: Duration::from_millis(DEFAULT_LIVENESS_TIMEOUT_MS),
            reconnect_timeout: Duration::from_millis(DEFAULT_RECONNECT_TIMEOUT_MS),
            aggregation_window: Duration::from_millis(DEFAULT_AGGREGATION_WINDOW_MS),
            required_ppe_classes: PpeClass::all_labels(),
            file_size_limit_bytes: None,
            stop_grace_period: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            reorder_capacity: DEFAULT_REORDER_CAPACITY,
            reorder_max_delay: Duration::from_millis(DEFAULT_REORDER_MAX_DELAY_MS),
            min_confidence: 0.0,
            grouping: GroupingMode::PerObject,
            backoff: BackoffPolicy::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}
