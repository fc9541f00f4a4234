//! Cross-metric correlation signatures
//!
//! Fixed paired rules over the snapshot that recognize unusual metric
//! combinations no single-metric detector would flag, e.g. a high error
//! rate while latency stays moderate (failing fast, not slow).

use std::collections::HashMap;

use crate::history::MetricHistory;
use crate::models::{AnomalyAlert, AnomalyType, Severity};

use super::Detector;

/// One side of a correlation predicate
#[derive(Debug, Clone)]
enum Condition {
    Above { metric: String, bound: f64 },
    Below { metric: String, bound: f64 },
}

impl Condition {
    fn metric(&self) -> &str {
        match self {
            Condition::Above { metric, .. } | Condition::Below { metric, .. } => metric,
        }
    }

    fn bound(&self) -> f64 {
        match self {
            Condition::Above { bound, .. } | Condition::Below { bound, .. } => *bound,
        }
    }

    fn holds(&self, snapshot: &HashMap<String, f64>) -> Option<f64> {
        let value = *snapshot.get(self.metric())?;
        let ok = match self {
            Condition::Above { bound, .. } => value > *bound,
            Condition::Below { bound, .. } => value < *bound,
        };
        ok.then_some(value)
    }
}

/// A multi-metric signature: every condition must hold simultaneously
#[derive(Debug, Clone)]
pub struct CorrelationRule {
    pub name: &'static str,
    pub message: &'static str,
    pub severity: Severity,
    conditions: Vec<Condition>,
}

impl CorrelationRule {
    /// High error rate with only moderate latency: requests are failing
    /// fast rather than timing out, which points at a broken dependency.
    fn error_latency_divergence(scale: f64) -> Self {
        Self {
            name: "error_latency_divergence",
            message: "high error rate with moderate latency (failing fast)",
            severity: Severity::High,
            conditions: vec![
                Condition::Above {
                    metric: "error_rate".to_string(),
                    bound: 10.0 * scale,
                },
                Condition::Below {
                    metric: "avg_latency_ms".to_string(),
                    bound: 500.0 / scale,
                },
            ],
        }
    }

    /// Spend climbing while trace volume stays low: cost per unit of work
    /// has broken down.
    fn cost_efficiency_breakdown(scale: f64) -> Self {
        Self {
            name: "cost_efficiency_breakdown",
            message: "high cost with low trace volume (cost efficiency breakdown)",
            severity: Severity::Medium,
            conditions: vec![
                Condition::Above {
                    metric: "total_cost".to_string(),
                    bound: 50.0 * scale,
                },
                Condition::Below {
                    metric: "total_traces".to_string(),
                    bound: 100.0 / scale,
                },
            ],
        }
    }
}

/// Evaluates the fixed correlation rule set against each snapshot
pub struct CorrelationDetector {
    rules: Vec<CorrelationRule>,
}

impl CorrelationDetector {
    /// Build the default rules; `sensitivity` scales the rule bounds
    /// (values above 1.0 make every rule harder to trigger).
    pub fn new(sensitivity: f64) -> Self {
        let scale = if sensitivity > 0.0 { sensitivity } else { 1.0 };
        Self {
            rules: vec![
                CorrelationRule::error_latency_divergence(scale),
                CorrelationRule::cost_efficiency_breakdown(scale),
            ],
        }
    }

    pub fn with_rules(rules: Vec<CorrelationRule>) -> Self {
        Self { rules }
    }
}

impl Default for CorrelationDetector {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Detector for CorrelationDetector {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn detect(
        &self,
        snapshot: &HashMap<String, f64>,
        _history: &MetricHistory,
    ) -> anyhow::Result<Vec<AnomalyAlert>> {
        let mut alerts = Vec::new();

        for rule in &self.rules {
            let mut observed = Vec::with_capacity(rule.conditions.len());
            for condition in &rule.conditions {
                match condition.holds(snapshot) {
                    Some(value) => observed.push((condition, value)),
                    None => {
                        observed.clear();
                        break;
                    }
                }
            }
            if observed.is_empty() {
                continue;
            }

            // The first condition names the driving metric
            let (primary, actual) = (&observed[0].0, observed[0].1);
            let contributors: serde_json::Map<String, serde_json::Value> = observed
                .iter()
                .map(|(c, v)| (c.metric().to_string(), serde_json::json!(v)))
                .collect();

            alerts.push(AnomalyAlert::new(
                AnomalyType::Correlation,
                primary.metric(),
                rule.severity,
                actual,
                primary.bound(),
                if primary.bound().abs() > f64::EPSILON {
                    (actual / primary.bound()).abs()
                } else {
                    actual.abs()
                },
                format!("{}: {}", rule.name, rule.message),
                serde_json::json!({
                    "rule": rule.name,
                    "contributing_metrics": serde_json::Value::Object(contributors),
                }),
            ));
        }

        Ok(alerts)
    }
}
