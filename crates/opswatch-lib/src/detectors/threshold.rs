//! Static threshold rules
//!
//! Per-metric comparator rules evaluated in descending severity order.
//! First match wins, so a metric fires at most once per cycle.

use std::collections::HashMap;

use crate::history::MetricHistory;
use crate::models::{AnomalyAlert, AnomalyType, Severity};

use super::Detector;

/// Direction of a threshold breach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Above,
    Below,
}

/// One static rule: fire when the metric crosses the bound
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    pub metric_name: String,
    pub comparator: Comparator,
    pub bound: f64,
    pub severity: Severity,
}

impl ThresholdRule {
    pub fn above(metric: &str, bound: f64, severity: Severity) -> Self {
        Self {
            metric_name: metric.to_string(),
            comparator: Comparator::Above,
            bound,
            severity,
        }
    }

    pub fn below(metric: &str, bound: f64, severity: Severity) -> Self {
        Self {
            metric_name: metric.to_string(),
            comparator: Comparator::Below,
            bound,
            severity,
        }
    }

    fn matches(&self, value: f64) -> bool {
        match self.comparator {
            Comparator::Above => value > self.bound,
            Comparator::Below => value < self.bound,
        }
    }
}

/// Evaluates static per-metric comparator rules
pub struct ThresholdDetector {
    /// Rules grouped by metric, sorted most severe first
    rules: HashMap<String, Vec<ThresholdRule>>,
}

impl ThresholdDetector {
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        let mut grouped: HashMap<String, Vec<ThresholdRule>> = HashMap::new();
        for rule in rules {
            grouped.entry(rule.metric_name.clone()).or_default().push(rule);
        }
        for list in grouped.values_mut() {
            list.sort_by(|a, b| b.severity.cmp(&a.severity));
        }
        Self { rules: grouped }
    }

    /// Default operational rule set for the monitored metric family
    pub fn with_default_rules() -> Self {
        Self::new(vec![
            ThresholdRule::above("error_rate", 20.0, Severity::Critical),
            ThresholdRule::above("error_rate", 10.0, Severity::High),
            ThresholdRule::above("error_rate", 5.0, Severity::Medium),
            ThresholdRule::above("avg_latency_ms", 5000.0, Severity::Critical),
            ThresholdRule::above("avg_latency_ms", 2000.0, Severity::High),
            ThresholdRule::above("avg_latency_ms", 1000.0, Severity::Medium),
            ThresholdRule::below("success_rate", 50.0, Severity::Critical),
            ThresholdRule::below("success_rate", 80.0, Severity::Medium),
            ThresholdRule::above("total_cost", 100.0, Severity::High),
            ThresholdRule::above("total_cost", 50.0, Severity::Medium),
        ])
    }
}

impl Detector for ThresholdDetector {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn detect(
        &self,
        snapshot: &HashMap<String, f64>,
        _history: &MetricHistory,
    ) -> anyhow::Result<Vec<AnomalyAlert>> {
        let mut alerts = Vec::new();

        for (metric, &value) in snapshot {
            let Some(rules) = self.rules.get(metric) else {
                continue;
            };

            // Most severe rule first; one alert per metric per cycle
            if let Some(rule) = rules.iter().find(|r| r.matches(value)) {
                let direction = match rule.comparator {
                    Comparator::Above => "above",
                    Comparator::Below => "below",
                };
                alerts.push(AnomalyAlert::new(
                    AnomalyType::Threshold,
                    metric,
                    rule.severity,
                    value,
                    rule.bound,
                    if rule.bound.abs() > f64::EPSILON {
                        (value / rule.bound).abs()
                    } else {
                        value.abs()
                    },
                    format!(
                        "{} is {:.2}, {} threshold {:.2}",
                        metric, value, direction, rule.bound
                    ),
                    serde_json::json!({
                        "bound": rule.bound,
                        "direction": direction,
                    }),
                ));
            }
        }

        Ok(alerts)
    }
}
