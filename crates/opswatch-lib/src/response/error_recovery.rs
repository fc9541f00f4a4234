//! Error recovery handler
//!
//! Claims error-rate, success-rate and data-source health anomalies.
//! Mitigations isolate or restart the failing dependency: circuit
//! breaking, source sync restart, and (critical only) data-source
//! failover behind the approval gate.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::models::{AnomalyAlert, ResponseAction, Severity};

use super::ResponseHandler;

const HANDLER_ID: &str = "error_recovery";

const ERROR_METRICS: &[&str] = &["error_rate", "success_rate", "data_source_health"];

pub struct ErrorRecoveryHandler {
    breaker_cooldown_seconds: u64,
}

impl ErrorRecoveryHandler {
    pub fn new() -> Self {
        Self {
            breaker_cooldown_seconds: 120,
        }
    }
}

impl Default for ErrorRecoveryHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseHandler for ErrorRecoveryHandler {
    fn handler_id(&self) -> &'static str {
        HANDLER_ID
    }

    fn can_handle(&self, alert: &AnomalyAlert) -> bool {
        ERROR_METRICS.contains(&alert.metric_name.as_str())
    }

    fn response_actions(&self, alert: &AnomalyAlert) -> Vec<ResponseAction> {
        let mut actions = vec![
            ResponseAction::new(
                "enable_circuit_breaker",
                "Open the circuit breaker on the failing dependency",
                HANDLER_ID,
                false,
                json!({ "cooldown_seconds": self.breaker_cooldown_seconds }),
            ),
            ResponseAction::new(
                "restart_source_sync",
                "Restart synchronization with the data source",
                HANDLER_ID,
                false,
                json!({}),
            ),
        ];

        if alert.severity == Severity::Critical {
            actions.push(ResponseAction::new(
                "failover_data_source",
                "Switch to the secondary data source",
                HANDLER_ID,
                true,
                json!({ "target": "secondary" }),
            ));
        }

        actions
    }

    fn validate_action(
        &self,
        _action: &ResponseAction,
        alert: &AnomalyAlert,
    ) -> std::result::Result<(), String> {
        if alert.severity < Severity::Medium {
            return Err(format!(
                "severity {} below actionable floor for error recovery",
                alert.severity
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
            "Applying error recovery"
        );
        match action.name.as_str() {
            "enable_circuit_breaker" => Ok(json!({
                "action": "enable_circuit_breaker",
                "cooldown_seconds": self.breaker_cooldown_seconds,
                "applied": true,
            })),
            "restart_source_sync" => Ok(json!({
                "action": "restart_source_sync",
                "applied": true,
            })),
            "failover_data_source" => Ok(json!({
                "action": "failover_data_source",
                "target": action.params["target"],
                "applied": true,
            })),
            other => anyhow::bail!("unknown error recovery action '{}'", other),
        }
    }

    async fn rollback_action(
        &self,
        action: &ResponseAction,
        _alert: &AnomalyAlert,
    ) -> Result<serde_json::Value> {
        match action.name.as_str() {
            "enable_circuit_breaker" => Ok(json!({
                "action": "close_circuit_breaker",
                "applied": true,
            })),
            // A restart is not reversible; failover needs a fresh decision
            other => anyhow::bail!("no rollback defined for action '{}'", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnomalyType;

    fn alert(severity: Severity) -> AnomalyAlert {
        AnomalyAlert::new(
            AnomalyType::Threshold,
            "error_rate",
            severity,
            25.0,
            20.0,
            1.25,
            "error rate above threshold",
            serde_json::Value::Null,
        )
    }

    #[test]
    fn test_claims_error_metrics() {
        let handler = ErrorRecoveryHandler::new();
        assert!(handler.can_handle(&alert(Severity::High)));

        let mut health = alert(Severity::High);
        health.metric_name = "data_source_health".to_string();
        assert!(handler.can_handle(&health));

        let mut cost = alert(Severity::High);
        cost.metric_name = "total_cost".to_string();
        assert!(!handler.can_handle(&cost));
    }

    #[test]
    fn test_failover_only_for_critical() {
        let handler = ErrorRecoveryHandler::new();
        assert_eq!(handler.response_actions(&alert(Severity::High)).len(), 2);

        let actions = handler.response_actions(&alert(Severity::Critical));
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().any(|a| a.name == "failover_data_source" && a.requires_approval));
    }

    #[tokio::test]
    async fn test_restart_has_no_rollback() {
        let handler = ErrorRecoveryHandler::new();
        let a = alert(Severity::High);
        let restart = handler
            .response_actions(&a)
            .into_iter()
            .find(|x| x.name == "restart_source_sync")
            .unwrap();

        assert!(handler.execute_action(&restart, &a).await.is_ok());
        assert!(handler.rollback_action(&restart, &a).await.is_err());
    }

    #[tokio::test]
    async fn test_breaker_rollback_closes() {
        let handler = ErrorRecoveryHandler::new();
        let a = alert(Severity::High);
        let breaker = handler
            .response_actions(&a)
            .into_iter()
            .find(|x| x.name == "enable_circuit_breaker")
            .unwrap();

        let rollback = handler.rollback_action(&breaker, &a).await.unwrap();
        assert_eq!(rollback["action"], "close_circuit_breaker");
    }
}
