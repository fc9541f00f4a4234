//! Statistical (z-score) anomaly detection
//!
//! Flags snapshot values whose distance from the historical mean exceeds a
//! configurable number of standard deviations.

use std::collections::HashMap;

use crate::history::MetricHistory;
use crate::models::{AnomalyAlert, AnomalyType, Severity};

use super::Detector;

/// Minimum historical points required for meaningful statistics
const MIN_SAMPLES: usize = 5;

/// Number of history points considered per metric
const HISTORY_WINDOW: usize = 100;

/// Detects values exceeding a standard-deviation threshold
pub struct StatisticalDetector {
    /// Number of standard deviations to consider anomalous
    pub threshold: f64,
}

impl StatisticalDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn severity_for(z_score: f64) -> Severity {
        let z = z_score.abs();
        if z >= 4.0 {
            Severity::Critical
        } else if z >= 3.0 {
            Severity::High
        } else if z >= 2.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl Default for StatisticalDetector {
    fn default() -> Self {
        Self { threshold: 2.0 }
    }
}

impl Detector for StatisticalDetector {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn detect(
        &self,
        snapshot: &HashMap<String, f64>,
        history: &MetricHistory,
    ) -> anyhow::Result<Vec<AnomalyAlert>> {
        let mut alerts = Vec::new();

        for (metric, &value) in snapshot {
            let values = history.values(metric, HISTORY_WINDOW);
            if values.len() < MIN_SAMPLES {
                continue;
            }

            let (mean, std_dev) = mean_and_std_dev(&values);

            // Insufficient variance: skip rather than divide by zero
            if std_dev < f64::EPSILON {
                continue;
            }

            let z_score = (value - mean) / std_dev;
            if z_score.abs() > self.threshold {
                alerts.push(AnomalyAlert::new(
                    AnomalyType::Statistical,
                    metric,
                    Self::severity_for(z_score),
                    value,
                    mean,
                    z_score,
                    format!(
                        "{} deviates from baseline: {:.2} vs mean {:.2} (z-score {:.1})",
                        metric, value, mean, z_score
                    ),
                    serde_json::json!({
                        "mean": mean,
                        "std_dev": std_dev,
                        "samples": values.len(),
                        "threshold_sigma": self.threshold,
                    }),
                ));
            }
        }

        Ok(alerts)
    }
}

/// Mean and sample standard deviation (Bessel's correction)
fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    if values.len() < 2 {
        return (mean, 0.0);
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}
