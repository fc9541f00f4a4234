//! End-to-end pipeline test: a metric spike flows from the metrics source
//! through detection, dedup and auto-response, then through the approval
//! gate to execution and rollback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use opswatch_lib::audit::{MemoryAuditStore, NoopNotifier};
use opswatch_lib::models::{ExecutionStatus, Severity};
use opswatch_lib::monitor::{MetricsSource, MonitorConfig, MonitoringEngine};
use opswatch_lib::response::{default_handlers, ResponseEngine};

/// Replays a scripted sequence of snapshots, repeating the last one
struct ScriptedSource {
    script: Vec<HashMap<String, f64>>,
    cursor: AtomicUsize,
}

impl ScriptedSource {
    fn new(script: Vec<HashMap<String, f64>>) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetricsSource for ScriptedSource {
    async fn fetch(&self, _window: Duration) -> anyhow::Result<HashMap<String, f64>> {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        let i = i.min(self.script.len() - 1);
        Ok(self.script[i].clone())
    }
}

fn error_rate(value: f64) -> HashMap<String, f64> {
    HashMap::from([("error_rate".to_string(), value)])
}

/// Ten quiet error-rate samples around 2.0, then a sustained spike to 25.0
fn spike_script() -> Vec<HashMap<String, f64>> {
    [1.8, 2.1, 1.9, 2.2, 2.0, 1.8, 2.1, 1.9, 2.2, 2.0]
        .iter()
        .map(|v| error_rate(*v))
        .chain(std::iter::once(error_rate(25.0)))
        .collect()
}

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(10),
        ..MonitorConfig::default()
    }
}

#[tokio::test]
async fn spike_produces_one_alert_with_approval_gated_response() {
    let audit = Arc::new(MemoryAuditStore::new());
    let responder = ResponseEngine::new(default_handlers(), audit.clone(), Arc::new(NoopNotifier));
    let engine = MonitoringEngine::new(
        fast_config(),
        Arc::new(ScriptedSource::new(spike_script())),
        Some(responder.clone()),
        audit.clone(),
        Arc::new(NoopNotifier),
    );

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;
    engine.stop().await;

    // Several detectors flag the spike, but per-metric cooldown dedups
    // them to a single queued alert even as the spike persists.
    let alerts = engine.recent_anomalies(100);
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.metric_name, "error_rate");
    assert_eq!(alert.severity, Severity::Critical);
    assert!(alert.auto_response_triggered);
    assert!(!alert.response_actions.is_empty());

    let status = engine.status().await;
    assert!(status.statistics.polls_completed > 10);
    assert!(status.statistics.alerts_suppressed_cooldown >= 1);

    // The alert was persisted alongside the execution records
    assert_eq!(audit.alerts().await.len(), 1);
    assert!(!audit.executions().await.is_empty());

    // Critical severity forces every proposed action through the gate
    let executions = responder.recent_executions(10).await;
    assert!(!executions.is_empty());
    assert!(executions
        .iter()
        .all(|e| e.status == ExecutionStatus::RequiresApproval));
    assert_eq!(
        responder.pending_approvals().await.len(),
        executions.len()
    );
}

#[tokio::test]
async fn approved_action_executes_and_rolls_back() {
    let audit = Arc::new(MemoryAuditStore::new());
    let responder = ResponseEngine::new(default_handlers(), audit.clone(), Arc::new(NoopNotifier));
    let engine = MonitoringEngine::new(
        fast_config(),
        Arc::new(ScriptedSource::new(spike_script())),
        Some(responder.clone()),
        audit.clone(),
        Arc::new(NoopNotifier),
    );

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;
    engine.stop().await;

    let breaker = responder
        .recent_executions(10)
        .await
        .into_iter()
        .find(|e| e.action_name == "enable_circuit_breaker")
        .expect("circuit breaker execution proposed");
    assert_eq!(breaker.status, ExecutionStatus::RequiresApproval);

    // Approval resolves exactly once
    assert!(responder.approve_pending_action(breaker.id, true, "oncall").await);
    assert!(!responder.approve_pending_action(breaker.id, true, "oncall").await);

    let executed = responder.execution(breaker.id).await.unwrap();
    assert_eq!(executed.status, ExecutionStatus::Success);
    assert!(executed.impact_assessment.is_some());

    // Rollback is only legal from success, and only once
    assert!(responder.rollback_execution(breaker.id).await);
    let rolled = responder.execution(breaker.id).await.unwrap();
    assert_eq!(rolled.status, ExecutionStatus::RolledBack);
    assert!(rolled.rollback_executed);
    assert!(!responder.rollback_execution(breaker.id).await);
}

#[tokio::test]
async fn quiet_metrics_produce_no_alerts() {
    let audit = Arc::new(MemoryAuditStore::new());
    let engine = MonitoringEngine::new(
        fast_config(),
        Arc::new(ScriptedSource::new(vec![error_rate(2.0)])),
        None,
        audit.clone(),
        Arc::new(NoopNotifier),
    );

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.stop().await;

    assert!(engine.recent_anomalies(100).is_empty());
    assert!(audit.alerts().await.is_empty());
}
