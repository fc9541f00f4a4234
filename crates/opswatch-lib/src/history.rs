//! Bounded per-metric history of observed values
//!
//! Each metric keeps its own fixed-capacity, time-ordered buffer. Buffers
//! are independent DashMap entries, so appending to one metric never
//! contends with reads of another.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;

use crate::models::MetricPoint;

/// Default number of points retained per metric
const DEFAULT_CAPACITY: usize = 500;

/// Fixed-capacity, time-ordered store of metric points
pub struct MetricHistory {
    buffers: DashMap<String, VecDeque<MetricPoint>>,
    capacity: usize,
}

impl MetricHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a point, evicting the oldest once the buffer is full
    pub fn append(&self, point: MetricPoint) {
        let mut buffer = self
            .buffers
            .entry(point.metric_name.clone())
            .or_insert_with(VecDeque::new);
        buffer.push_back(point);
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    /// Points for a metric whose timestamp falls within the trailing window
    pub fn recent(&self, metric_name: &str, window: Duration) -> Vec<MetricPoint> {
        let cutoff = Utc::now() - chrono::Duration::from_std(window).unwrap_or_default();
        match self.buffers.get(metric_name) {
            Some(buffer) => buffer
                .iter()
                .filter(|p| p.timestamp >= cutoff)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// The most recent `max` values for a metric, oldest first
    pub fn values(&self, metric_name: &str, max: usize) -> Vec<f64> {
        match self.buffers.get(metric_name) {
            Some(buffer) => {
                let skip = buffer.len().saturating_sub(max);
                buffer.iter().skip(skip).map(|p| p.value).collect()
            }
            None => Vec::new(),
        }
    }

    /// Number of points retained for a metric
    pub fn len(&self, metric_name: &str) -> usize {
        self.buffers.get(metric_name).map_or(0, |b| b.len())
    }

    pub fn is_empty(&self, metric_name: &str) -> bool {
        self.len(metric_name) == 0
    }

    /// Names of all metrics with at least one retained point
    pub fn metric_names(&self) -> Vec<String> {
        self.buffers.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::new()
    }
}
