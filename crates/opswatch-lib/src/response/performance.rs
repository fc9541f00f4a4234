//! Performance remediation handler
//!
//! Claims latency and throughput anomalies. Mitigations trade freshness
//! or capacity for latency: response caching, concurrency reduction, and
//! (for severe cases) provider failover behind the approval gate.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::models::{AnomalyAlert, ResponseAction, Severity};

use super::ResponseHandler;

const HANDLER_ID: &str = "performance";

const LATENCY_METRICS: &[&str] = &["avg_latency_ms", "p95_latency_ms", "throughput"];

pub struct PerformanceHandler {
    /// Fraction the concurrency limiter is reduced to
    concurrency_factor: f64,
    /// TTL for the response cache, seconds
    cache_ttl_seconds: u64,
}

impl PerformanceHandler {
    pub fn new() -> Self {
        Self {
            concurrency_factor: 0.5,
            cache_ttl_seconds: 300,
        }
    }
}

impl Default for PerformanceHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseHandler for PerformanceHandler {
    fn handler_id(&self) -> &'static str {
        HANDLER_ID
    }

    fn can_handle(&self, alert: &AnomalyAlert) -> bool {
        LATENCY_METRICS.contains(&alert.metric_name.as_str())
    }

    fn response_actions(&self, alert: &AnomalyAlert) -> Vec<ResponseAction> {
        let mut actions = vec![
            ResponseAction::new(
                "enable_response_cache",
                "Serve cacheable responses from the cache to shed latency",
                HANDLER_ID,
                false,
                json!({ "ttl_seconds": self.cache_ttl_seconds }),
            ),
            ResponseAction::new(
                "reduce_concurrency",
                "Lower the concurrency limit to relieve saturation",
                HANDLER_ID,
                false,
                json!({ "factor": self.concurrency_factor }),
            ),
        ];

        if alert.severity >= Severity::High {
            actions.push(ResponseAction::new(
                "failover_provider",
                "Shift traffic to the standby provider",
                HANDLER_ID,
                true,
                json!({ "target": "standby" }),
            ));
        }

        actions
    }

    fn validate_action(
        &self,
        action: &ResponseAction,
        alert: &AnomalyAlert,
    ) -> std::result::Result<(), String> {
        if alert.severity < Severity::Medium {
            return Err(format!(
                "severity {} below actionable floor for performance remediation",
                alert.severity
            ));
        }
        if action.name == "reduce_concurrency" {
            let factor = action.params["factor"].as_f64().unwrap_or(0.0);
            if !(0.0..1.0).contains(&factor) || factor == 0.0 {
                return Err(format!("concurrency factor {} out of range", factor));
            }
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
            "Applying performance remediation"
        );
        match action.name.as_str() {
            "enable_response_cache" => Ok(json!({
                "action": "enable_response_cache",
                "ttl_seconds": self.cache_ttl_seconds,
                "applied": true,
            })),
            "reduce_concurrency" => Ok(json!({
                "action": "reduce_concurrency",
                "factor": self.concurrency_factor,
                "applied": true,
            })),
            "failover_provider" => Ok(json!({
                "action": "failover_provider",
                "target": action.params["target"],
                "applied": true,
            })),
            other => anyhow::bail!("unknown performance action '{}'", other),
        }
    }

    async fn rollback_action(
        &self,
        action: &ResponseAction,
        _alert: &AnomalyAlert,
    ) -> Result<serde_json::Value> {
        match action.name.as_str() {
            "enable_response_cache" => Ok(json!({
                "action": "disable_response_cache",
                "applied": true,
            })),
            "reduce_concurrency" => Ok(json!({
                "action": "restore_concurrency",
                "applied": true,
            })),
            // Traffic already moved; shifting back needs a fresh decision
            other => anyhow::bail!("no rollback defined for action '{}'", other),
        }
    }
}
