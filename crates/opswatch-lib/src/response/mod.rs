//! Automated response to detected anomalies
//!
//! Handlers declare which anomalies they can remediate and propose
//! actions; the response engine validates, executes (directly or through
//! the approval gate), tracks execution records, and supports rollback.

mod cost;
mod engine;
mod error_recovery;
mod performance;

pub use cost::CostHandler;
pub use engine::{ResponseEngine, ResponseStatistics};
pub use error_recovery::ErrorRecoveryHandler;
pub use performance::PerformanceHandler;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{AnomalyAlert, ResponseAction};

/// A remediation strategy for a class of anomalies
///
/// Handlers are stateless: proposed actions carry their parameters and
/// execution results are returned as JSON for the execution record.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    /// Stable identifier used to route executions back to this handler
    fn handler_id(&self) -> &'static str;

    /// Whether this handler knows how to remediate the alert
    fn can_handle(&self, alert: &AnomalyAlert) -> bool;

    /// Actions proposed for the alert; may be empty
    fn response_actions(&self, alert: &AnomalyAlert) -> Vec<ResponseAction>;

    /// Safety check before execution; `Err` carries the rejection reason
    fn validate_action(&self, action: &ResponseAction, alert: &AnomalyAlert)
        -> std::result::Result<(), String>;

    /// Execute the action; the returned JSON becomes `result_data`
    async fn execute_action(
        &self,
        action: &ResponseAction,
        alert: &AnomalyAlert,
    ) -> Result<serde_json::Value>;

    /// Reverse a previously successful action. Handlers without an inverse
    /// keep this default, which fails cleanly.
    async fn rollback_action(
        &self,
        action: &ResponseAction,
        _alert: &AnomalyAlert,
    ) -> Result<serde_json::Value> {
        bail!("no rollback defined for action '{}'", action.name)
    }
}

/// Default handler set wired by the daemon
pub fn default_handlers() -> Vec<std::sync::Arc<dyn ResponseHandler>> {
    vec![
        std::sync::Arc::new(PerformanceHandler::new()),
        std::sync::Arc::new(CostHandler::new()),
        std::sync::Arc::new(ErrorRecoveryHandler::new()),
    ]
}
