//! Rapid-increase pattern detection
//!
//! Looks at the last k points of a metric plus the fresh snapshot value and
//! flags a monotonic non-decreasing run whose last/first ratio exceeds a
//! configured multiple.

use std::collections::HashMap;

use crate::history::MetricHistory;
use crate::models::{AnomalyAlert, AnomalyType, Severity};

use super::Detector;

/// Detects sustained rapid growth over recent points
pub struct PatternDetector {
    /// Number of trailing history points examined
    pub window: usize,
    /// Minimum last/first ratio to flag
    pub ratio_threshold: f64,
}

impl PatternDetector {
    pub fn new(window: usize, ratio_threshold: f64) -> Self {
        Self {
            window: window.max(2),
            ratio_threshold,
        }
    }

    fn severity_for(ratio: f64) -> Severity {
        if ratio >= 10.0 {
            Severity::Critical
        } else if ratio >= 5.0 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self {
            window: 5,
            ratio_threshold: 3.0,
        }
    }
}

impl Detector for PatternDetector {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn detect(
        &self,
        snapshot: &HashMap<String, f64>,
        history: &MetricHistory,
    ) -> anyhow::Result<Vec<AnomalyAlert>> {
        let mut alerts = Vec::new();

        for (metric, &current) in snapshot {
            let mut series = history.values(metric, self.window - 1);
            series.push(current);
            if series.len() < self.window {
                continue;
            }

            let monotonic = series.windows(2).all(|w| w[1] >= w[0]);
            if !monotonic {
                continue;
            }

            let first = series[0];
            // Ratio is meaningless from a non-positive start
            if first <= f64::EPSILON {
                continue;
            }

            let ratio = current / first;
            if ratio > self.ratio_threshold {
                alerts.push(AnomalyAlert::new(
                    AnomalyType::Pattern,
                    metric,
                    Self::severity_for(ratio),
                    current,
                    first,
                    ratio,
                    format!(
                        "{} climbing rapidly: {:.2} -> {:.2} ({:.1}x over {} points)",
                        metric,
                        first,
                        current,
                        ratio,
                        series.len()
                    ),
                    serde_json::json!({
                        "window": series.len(),
                        "first": first,
                        "ratio_threshold": self.ratio_threshold,
                    }),
                ));
            }
        }

        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricPoint;
    use chrono::Utc;

    fn history_with(metric: &str, values: &[f64]) -> MetricHistory {
        let history = MetricHistory::new();
        for &v in values {
            history.append(MetricPoint {
                timestamp: Utc::now(),
                metric_name: metric.to_string(),
                value: v,
                source: "test".to_string(),
            });
        }
        history
    }

    fn snapshot(metric: &str, value: f64) -> HashMap<String, f64> {
        HashMap::from([(metric.to_string(), value)])
    }

    #[test]
    fn test_rapid_increase_flagged() {
        let detector = PatternDetector::default();
        let history = history_with("avg_latency_ms", &[100.0, 150.0, 220.0, 300.0]);

        let alerts = detector
            .detect(&snapshot("avg_latency_ms", 400.0), &history)
            .unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].anomaly_type, AnomalyType::Pattern);
        assert!((alerts[0].deviation_score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_monotonic_suppressed() {
        let detector = PatternDetector::default();
        // Same ratio but with a dip in the middle
        let history = history_with("avg_latency_ms", &[100.0, 150.0, 120.0, 300.0]);

        let alerts = detector
            .detect(&snapshot("avg_latency_ms", 400.0), &history)
            .unwrap();

        assert!(alerts.is_empty());
    }

    #[test]
    fn test_monotonic_but_slow_growth_suppressed() {
        let detector = PatternDetector::default();
        // Monotonic, but only 2x over the window
        let history = history_with("avg_latency_ms", &[100.0, 120.0, 150.0, 180.0]);

        let alerts = detector
            .detect(&snapshot("avg_latency_ms", 200.0), &history)
            .unwrap();

        assert!(alerts.is_empty());
    }

    #[test]
    fn test_insufficient_history_skipped() {
        let detector = PatternDetector::default();
        let history = history_with("avg_latency_ms", &[100.0, 200.0]);

        let alerts = detector
            .detect(&snapshot("avg_latency_ms", 900.0), &history)
            .unwrap();

        assert!(alerts.is_empty());
    }

    #[test]
    fn test_zero_start_skipped() {
        let detector = PatternDetector::default();
        let history = history_with("error_rate", &[0.0, 1.0, 2.0, 3.0]);

        let alerts = detector.detect(&snapshot("error_rate", 4.0), &history).unwrap();

        assert!(alerts.is_empty());
    }

    #[test]
    fn test_severity_scales_with_ratio() {
        let detector = PatternDetector::default();

        let history = history_with("total_cost", &[10.0, 20.0, 40.0, 80.0]);
        let alerts = detector.detect(&snapshot("total_cost", 120.0), &history).unwrap();
        assert_eq!(alerts[0].severity, Severity::Critical);

        let history = history_with("total_cost", &[10.0, 15.0, 20.0, 30.0]);
        let alerts = detector.detect(&snapshot("total_cost", 40.0), &history).unwrap();
        assert_eq!(alerts[0].severity, Severity::Medium);
    }
}
