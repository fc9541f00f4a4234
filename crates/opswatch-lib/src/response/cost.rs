//! Cost remediation handler
//!
//! Claims budget and cost-efficiency anomalies. Mitigations reduce spend
//! per unit of work: switching to the economy model tier (approval-gated
//! when severe) and tightening request rate limits.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::models::{AnomalyAlert, ResponseAction, Severity};

use super::ResponseHandler;

const HANDLER_ID: &str = "cost";

const COST_METRICS: &[&str] = &["total_cost", "cost_per_trace"];

/// Minimum overage ratio before a model switch is worth the quality cost
const MODEL_SWITCH_FLOOR: f64 = 1.2;

pub struct CostHandler {
    economy_model: String,
    rate_limit_factor: f64,
}

impl CostHandler {
    pub fn new() -> Self {
        Self {
            economy_model: "economy-tier".to_string(),
            rate_limit_factor: 0.7,
        }
    }
}

impl Default for CostHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseHandler for CostHandler {
    fn handler_id(&self) -> &'static str {
        HANDLER_ID
    }

    fn can_handle(&self, alert: &AnomalyAlert) -> bool {
        COST_METRICS.contains(&alert.metric_name.as_str())
    }

    fn response_actions(&self, alert: &AnomalyAlert) -> Vec<ResponseAction> {
        vec![
            ResponseAction::new(
                "switch_to_economy_model",
                "Route new requests to the economy model tier",
                HANDLER_ID,
                alert.severity >= Severity::High,
                json!({ "model": self.economy_model }),
            ),
            ResponseAction::new(
                "tighten_rate_limits",
                "Reduce per-client rate limits to curb spend",
                HANDLER_ID,
                false,
                json!({ "factor": self.rate_limit_factor }),
            ),
        ]
    }

    fn validate_action(
        &self,
        action: &ResponseAction,
        alert: &AnomalyAlert,
    ) -> std::result::Result<(), String> {
        if action.name == "switch_to_economy_model" && alert.deviation_score < MODEL_SWITCH_FLOOR {
            return Err(format!(
                "cost overage {:.2}x is marginal; model switch not justified",
                alert.deviation_score
            ));
        }
        Ok(())
    }

    async fn execute_action(
        &self,
        action: &ResponseAction,
        alert: &AnomalyAlert,
    ) -> Result<serde_json::Value> {
        info!(
            action = %action.name,
            metric = %alert.metric_name,
            "Applying cost remediation"
        );
        match action.name.as_str() {
            "switch_to_economy_model" => Ok(json!({
                "action": "switch_to_economy_model",
                "model": self.economy_model,
                "previous_model": "standard-tier",
                "applied": true,
            })),
            "tighten_rate_limits" => Ok(json!({
                "action": "tighten_rate_limits",
                "factor": self.rate_limit_factor,
                "applied": true,
            })),
            other => anyhow::bail!("unknown cost action '{}'", other),
        }
    }

    async fn rollback_action(
        &self,
        action: &ResponseAction,
        _alert: &AnomalyAlert,
    ) -> Result<serde_json::Value> {
        match action.name.as_str() {
            "switch_to_economy_model" => Ok(json!({
                "action": "restore_model_tier",
                "model": "standard-tier",
                "applied": true,
            })),
            "tighten_rate_limits" => Ok(json!({
                "action": "restore_rate_limits",
                "applied": true,
            })),
            other => anyhow::bail!("no rollback defined for action '{}'", other),
        }
    }
}
