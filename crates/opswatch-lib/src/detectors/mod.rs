//! Anomaly detection strategies
//!
//! Each detector is pure over a fresh snapshot plus the metric history:
//! - Statistical: z-score deviation from the historical mean
//! - Threshold: static per-metric comparator rules
//! - Pattern: rapid monotonic increase over recent points
//! - Correlation: multi-metric combination signatures

mod correlation;
mod pattern;
mod statistical;
mod threshold;

pub use correlation::{CorrelationDetector, CorrelationRule};
pub use pattern::PatternDetector;
pub use statistical::StatisticalDetector;
pub use threshold::{Comparator, ThresholdDetector, ThresholdRule};

use std::collections::HashMap;

use crate::history::MetricHistory;
use crate::models::AnomalyAlert;

/// A detection strategy over one poll cycle's snapshot
///
/// Detectors never mutate history; their outputs are concatenated by the
/// monitoring engine and deduplicated downstream. An `Err` from one
/// detector is isolated by the engine so the others still run.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(
        &self,
        snapshot: &HashMap<String, f64>,
        history: &MetricHistory,
    ) -> anyhow::Result<Vec<AnomalyAlert>>;
}
