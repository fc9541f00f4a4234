//! Response engine
//!
//! Drives the execution state machine:
//! `pending -> executing -> {success | failed}`, with the approval detour
//! `pending -> requires_approval -> executing -> {success | failed}` and
//! the one-way `success -> rolled_back` transition.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::audit::{AuditStore, NotificationSink};
use crate::models::{
    AnomalyAlert, ApprovalRequest, ExecutionStatus, ImpactAssessment, ResponseAction,
    ResponseExecution, Severity,
};
use crate::observability::{EngineMetrics, StructuredLogger};

use super::ResponseHandler;

/// One tracked execution plus everything needed to re-dispatch it
/// (approval resumption, rollback).
struct ExecutionEntry {
    execution: ResponseExecution,
    action: ResponseAction,
    alert: AnomalyAlert,
}

#[derive(Default)]
struct EngineState {
    executions: HashMap<Uuid, ExecutionEntry>,
    pending_approvals: HashMap<Uuid, ApprovalRequest>,
}

/// Aggregated execution statistics, derived on demand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseStatistics {
    pub total_executions: usize,
    pub by_status: HashMap<String, usize>,
    pub success_rate: f64,
    pub avg_execution_ms: f64,
    pub pending_approvals: usize,
}

/// Selects handlers, validates and executes actions, and tracks records
pub struct ResponseEngine {
    handlers: Vec<Arc<dyn ResponseHandler>>,
    state: Mutex<EngineState>,
    audit: Arc<dyn AuditStore>,
    notifier: Arc<dyn NotificationSink>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl ResponseEngine {
    pub fn new(
        handlers: Vec<Arc<dyn ResponseHandler>>,
        audit: Arc<dyn AuditStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            handlers,
            state: Mutex::new(EngineState::default()),
            audit,
            notifier,
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("responder"),
        })
    }

    /// Run the response pipeline for one alert
    ///
    /// Every handler that claims the alert contributes actions; each action
    /// is validated, then executed directly or parked behind the approval
    /// gate. A failing action never blocks the remaining ones.
    pub async fn process_anomaly(&self, alert: &AnomalyAlert) -> Vec<ResponseExecution> {
        let mut results = Vec::new();
        let mut state = self.state.lock().await;

        for handler in self.handlers.iter().filter(|h| h.can_handle(alert)) {
            for mut action in handler.response_actions(alert) {
                // Critical anomalies always go through the approval gate
                if alert.severity == Severity::Critical {
                    action.requires_approval = true;
                }

                let mut execution = ResponseExecution::new(alert.id, &action);

                if let Err(reason) = handler.validate_action(&action, alert) {
                    execution.status = ExecutionStatus::Failed;
                    execution.result_data = json!({ "validation_error": reason });
                    execution.completed_at = Some(Utc::now());
                } else if action.requires_approval {
                    execution.status = ExecutionStatus::RequiresApproval;
                    state.pending_approvals.insert(
                        execution.id,
                        ApprovalRequest {
                            execution_id: execution.id,
                            action_name: action.name.clone(),
                            action_description: action.description.clone(),
                            anomaly_severity: alert.severity,
                            requested_at: Utc::now(),
                        },
                    );
                } else {
                    execution.status = ExecutionStatus::Executing;
                    self.dispatch(handler.as_ref(), &action, alert, &mut execution)
                        .await;
                }

                self.record(&execution).await;
                results.push(execution.clone());
                state.executions.insert(
                    execution.id,
                    ExecutionEntry {
                        execution,
                        action,
                        alert: alert.clone(),
                    },
                );
            }
        }

        self.metrics
            .set_pending_approvals(state.pending_approvals.len() as i64);
        results
    }

    /// Resolve a pending approval exactly once
    ///
    /// Returns `true` when this call resolved the request (approved or
    /// denied); `false` when no pending request exists for the id, which
    /// includes the loser of two racing calls.
    pub async fn approve_pending_action(
        &self,
        execution_id: Uuid,
        approved: bool,
        approver: &str,
    ) -> bool {
        let mut state = self.state.lock().await;

        // Removing the request under the lock makes resolution first-writer-wins
        if state.pending_approvals.remove(&execution_id).is_none() {
            return false;
        }
        self.metrics
            .set_pending_approvals(state.pending_approvals.len() as i64);

        let Some(entry) = state.executions.get_mut(&execution_id) else {
            warn!(execution_id = %execution_id, "Approval resolved for unknown execution");
            return false;
        };
        if entry.execution.status != ExecutionStatus::RequiresApproval {
            return false;
        }

        self.logger.log_approval(execution_id, approved, approver);

        if !approved {
            entry.execution.status = ExecutionStatus::Failed;
            entry.execution.result_data =
                json!({ "reason": "not approved", "approver": approver });
            entry.execution.completed_at = Some(Utc::now());
            let execution = entry.execution.clone();
            self.record(&execution).await;
            return true;
        }

        entry.execution.status = ExecutionStatus::Executing;
        let handler = self.handler_for(&entry.execution.handler_id);
        match handler {
            Some(handler) => {
                let action = entry.action.clone();
                let alert = entry.alert.clone();
                let mut execution = entry.execution.clone();
                self.dispatch(handler.as_ref(), &action, &alert, &mut execution)
                    .await;
                entry.execution = execution.clone();
                self.record(&execution).await;
            }
            None => {
                entry.execution.status = ExecutionStatus::Failed;
                entry.execution.result_data = json!({
                    "reason": format!("handler '{}' not registered", entry.execution.handler_id)
                });
                entry.execution.completed_at = Some(Utc::now());
                let execution = entry.execution.clone();
                self.record(&execution).await;
            }
        }
        true
    }

    /// Reverse a successful execution via its handler's inverse operation
    ///
    /// Only legal from `success`; any other state (or a handler without a
    /// rollback) fails cleanly without mutating the record.
    pub async fn rollback_execution(&self, execution_id: Uuid) -> bool {
        let mut state = self.state.lock().await;

        let Some(entry) = state.executions.get_mut(&execution_id) else {
            return false;
        };
        if entry.execution.status != ExecutionStatus::Success || entry.execution.rollback_executed {
            return false;
        }

        let handler = self.handler_for(&entry.execution.handler_id);
        let Some(handler) = handler else {
            self.logger.log_rollback(execution_id, false);
            return false;
        };

        match handler.rollback_action(&entry.action, &entry.alert).await {
            Ok(data) => {
                entry.execution.status = ExecutionStatus::RolledBack;
                entry.execution.rollback_executed = true;
                entry.execution.result_data["rollback"] = data;
                let execution = entry.execution.clone();
                self.logger.log_rollback(execution_id, true);
                self.metrics.inc_responses("rolled_back");
                self.record(&execution).await;
                true
            }
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "Rollback not possible");
                self.logger.log_rollback(execution_id, false);
                false
            }
        }
    }

    /// Approval requests currently awaiting sign-off, oldest first
    pub async fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        let state = self.state.lock().await;
        let mut pending: Vec<_> = state.pending_approvals.values().cloned().collect();
        pending.sort_by_key(|r| r.requested_at);
        pending
    }

    pub async fn execution(&self, execution_id: Uuid) -> Option<ResponseExecution> {
        let state = self.state.lock().await;
        state
            .executions
            .get(&execution_id)
            .map(|e| e.execution.clone())
    }

    /// Recent executions, newest first
    pub async fn recent_executions(&self, limit: usize) -> Vec<ResponseExecution> {
        let state = self.state.lock().await;
        let mut executions: Vec<_> = state
            .executions
            .values()
            .map(|e| e.execution.clone())
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions.truncate(limit);
        executions
    }

    /// Aggregate statistics over all tracked executions
    pub async fn statistics(&self) -> ResponseStatistics {
        let state = self.state.lock().await;

        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut durations = Vec::new();
        let mut completed = 0usize;
        let mut succeeded = 0usize;

        for entry in state.executions.values() {
            let execution = &entry.execution;
            *by_status.entry(execution.status.to_string()).or_default() += 1;
            if let Some(ms) = execution.duration_ms() {
                durations.push(ms as f64);
            }
            if execution.status.is_terminal() {
                completed += 1;
                // A rolled-back execution did succeed before reversal
                if matches!(
                    execution.status,
                    ExecutionStatus::Success | ExecutionStatus::RolledBack
                ) {
                    succeeded += 1;
                }
            }
        }

        ResponseStatistics {
            total_executions: state.executions.len(),
            success_rate: if completed > 0 {
                succeeded as f64 / completed as f64
            } else {
                0.0
            },
            avg_execution_ms: if durations.is_empty() {
                0.0
            } else {
                durations.iter().sum::<f64>() / durations.len() as f64
            },
            pending_approvals: state.pending_approvals.len(),
            by_status,
        }
    }

    fn handler_for(&self, handler_id: &str) -> Option<Arc<dyn ResponseHandler>> {
        self.handlers
            .iter()
            .find(|h| h.handler_id() == handler_id)
            .cloned()
    }

    /// Run `execute_action` and record the terminal outcome on the execution
    async fn dispatch(
        &self,
        handler: &dyn ResponseHandler,
        action: &ResponseAction,
        alert: &AnomalyAlert,
        execution: &mut ResponseExecution,
    ) {
        match handler.execute_action(action, alert).await {
            Ok(data) => {
                execution.status = ExecutionStatus::Success;
                execution.result_data = data;
                execution.impact_assessment = Some(assess_impact(action, alert));
            }
            Err(e) => {
                execution.status = ExecutionStatus::Failed;
                execution.result_data = json!({ "error": e.to_string() });
            }
        }
        execution.completed_at = Some(Utc::now());
    }

    /// Persist and notify a terminal or parked execution, best effort
    async fn record(&self, execution: &ResponseExecution) {
        self.logger.log_execution(execution);
        if execution.status.is_terminal() {
            self.metrics.inc_responses(&execution.status.to_string());
        }
        if let Err(e) = self.audit.persist_execution(execution).await {
            warn!(execution_id = %execution.id, error = %e, "Failed to persist execution");
        }
        if let Err(e) = self.notifier.notify_execution(execution).await {
            warn!(execution_id = %execution.id, error = %e, "Failed to notify execution");
        }
    }
}

/// Expected improvement and resolution estimate for a successful action
fn assess_impact(action: &ResponseAction, alert: &AnomalyAlert) -> ImpactAssessment {
    let estimated_resolution_minutes = match alert.severity {
        Severity::Critical => 30,
        Severity::High => 20,
        Severity::Medium => 10,
        Severity::Low => 5,
    };
    ImpactAssessment {
        expected_improvement: format!(
            "{} should bring {} back toward {:.2}",
            action.name, alert.metric_name, alert.expected_value
        ),
        estimated_resolution_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryAuditStore, NoopNotifier};
    use crate::models::AnomalyType;
    use crate::response::{default_handlers, ErrorRecoveryHandler};

    fn engine() -> Arc<ResponseEngine> {
        ResponseEngine::new(
            default_handlers(),
            Arc::new(MemoryAuditStore::new()),
            Arc::new(NoopNotifier),
        )
    }

    fn alert(metric: &str, severity: Severity) -> AnomalyAlert {
        AnomalyAlert::new(
            AnomalyType::Threshold,
            metric,
            severity,
            25.0,
            20.0,
            1.25,
            "test anomaly",
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn test_high_severity_alert_executes_directly() {
        let engine = engine();
        let executions = engine.process_anomaly(&alert("error_rate", Severity::High)).await;

        assert_eq!(executions.len(), 2);
        assert!(executions
            .iter()
            .all(|e| e.status == ExecutionStatus::Success));
        assert!(executions.iter().all(|e| e.impact_assessment.is_some()));
        assert!(engine.pending_approvals().await.is_empty());
    }

    #[tokio::test]
    async fn test_critical_alert_parks_behind_approval() {
        let engine = engine();
        let executions = engine
            .process_anomaly(&alert("error_rate", Severity::Critical))
            .await;

        // Every action for a critical alert requires approval
        assert_eq!(executions.len(), 3);
        assert!(executions
            .iter()
            .all(|e| e.status == ExecutionStatus::RequiresApproval));
        assert_eq!(engine.pending_approvals().await.len(), 3);
    }

    #[tokio::test]
    async fn test_critical_never_succeeds_without_approval() {
        let engine = engine();
        let executions = engine
            .process_anomaly(&alert("error_rate", Severity::Critical))
            .await;

        for e in &executions {
            assert_ne!(e.status, ExecutionStatus::Success);
        }

        let id = executions[0].id;
        assert!(engine.approve_pending_action(id, true, "oncall").await);
        let resolved = engine.execution(id).await.unwrap();
        assert_eq!(resolved.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_denied_approval_fails_execution() {
        let engine = engine();
        let executions = engine
            .process_anomaly(&alert("error_rate", Severity::Critical))
            .await;
        let id = executions[0].id;

        assert!(engine.approve_pending_action(id, false, "oncall").await);
        let resolved = engine.execution(id).await.unwrap();
        assert_eq!(resolved.status, ExecutionStatus::Failed);
        assert_eq!(resolved.result_data["reason"], "not approved");
    }

    #[tokio::test]
    async fn test_approval_is_exactly_once() {
        let engine = engine();
        let executions = engine
            .process_anomaly(&alert("error_rate", Severity::Critical))
            .await;
        let id = executions[0].id;

        assert!(engine.approve_pending_action(id, true, "first").await);
        assert!(!engine.approve_pending_action(id, true, "second").await);
        assert!(!engine.approve_pending_action(id, false, "third").await);
    }

    #[tokio::test]
    async fn test_concurrent_approvals_one_winner() {
        let engine = engine();
        let executions = engine
            .process_anomaly(&alert("error_rate", Severity::Critical))
            .await;
        let id = executions[0].id;

        let (a, b) = tokio::join!(
            engine.approve_pending_action(id, true, "a"),
            engine.approve_pending_action(id, true, "b"),
        );
        assert!(a ^ b, "exactly one approval call must win");
    }

    #[tokio::test]
    async fn test_unknown_execution_approval_fails() {
        let engine = engine();
        assert!(!engine.approve_pending_action(Uuid::new_v4(), true, "x").await);
    }

    #[tokio::test]
    async fn test_validation_failure_marks_failed() {
        let engine = engine();
        // Low severity fails the error-recovery validation floor
        let executions = engine.process_anomaly(&alert("error_rate", Severity::Low)).await;

        assert_eq!(executions.len(), 2);
        for e in &executions {
            assert_eq!(e.status, ExecutionStatus::Failed);
            assert!(e.result_data["validation_error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_rollback_only_from_success() {
        let engine = engine();
        let executions = engine
            .process_anomaly(&alert("error_rate", Severity::Critical))
            .await;
        let id = executions[0].id;

        // requires_approval is not a legal rollback source
        assert!(!engine.rollback_execution(id).await);
        let unchanged = engine.execution(id).await.unwrap();
        assert_eq!(unchanged.status, ExecutionStatus::RequiresApproval);
        assert!(!unchanged.rollback_executed);
    }

    #[tokio::test]
    async fn test_rollback_round_trip() {
        let engine = engine();
        let executions = engine.process_anomaly(&alert("error_rate", Severity::High)).await;

        let breaker = executions
            .iter()
            .find(|e| e.action_name == "enable_circuit_breaker")
            .unwrap();
        assert_eq!(breaker.status, ExecutionStatus::Success);

        assert!(engine.rollback_execution(breaker.id).await);
        let rolled = engine.execution(breaker.id).await.unwrap();
        assert_eq!(rolled.status, ExecutionStatus::RolledBack);
        assert!(rolled.rollback_executed);
        assert!(engine.pending_approvals().await.is_empty());

        // Terminal: a second rollback fails
        assert!(!engine.rollback_execution(breaker.id).await);
    }

    #[tokio::test]
    async fn test_rollback_without_inverse_fails_cleanly() {
        let engine = engine();
        let executions = engine.process_anomaly(&alert("error_rate", Severity::High)).await;

        let restart = executions
            .iter()
            .find(|e| e.action_name == "restart_source_sync")
            .unwrap();
        assert_eq!(restart.status, ExecutionStatus::Success);

        assert!(!engine.rollback_execution(restart.id).await);
        let unchanged = engine.execution(restart.id).await.unwrap();
        assert_eq!(unchanged.status, ExecutionStatus::Success);
        assert!(!unchanged.rollback_executed);
    }

    #[tokio::test]
    async fn test_unclaimed_alert_yields_no_executions() {
        let engine = ResponseEngine::new(
            vec![Arc::new(ErrorRecoveryHandler::new())],
            Arc::new(MemoryAuditStore::new()),
            Arc::new(NoopNotifier),
        );
        let executions = engine
            .process_anomaly(&alert("avg_latency_ms", Severity::High))
            .await;
        assert!(executions.is_empty());
    }

    #[tokio::test]
    async fn test_statistics_derived_from_state() {
        let engine = engine();
        engine.process_anomaly(&alert("error_rate", Severity::High)).await;
        engine
            .process_anomaly(&alert("total_cost", Severity::Critical))
            .await;

        let stats = engine.statistics().await;
        assert_eq!(stats.total_executions, 4);
        assert_eq!(stats.by_status.get("success"), Some(&2));
        assert_eq!(stats.by_status.get("requires_approval"), Some(&2));
        assert_eq!(stats.pending_approvals, 2);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_executions_persisted_to_audit() {
        let audit = Arc::new(MemoryAuditStore::new());
        let engine = ResponseEngine::new(default_handlers(), audit.clone(), Arc::new(NoopNotifier));

        engine.process_anomaly(&alert("error_rate", Severity::High)).await;

        let persisted = audit.executions().await;
        assert_eq!(persisted.len(), 2);
        assert!(persisted
            .iter()
            .all(|e| e.status == ExecutionStatus::Success));
    }
}
