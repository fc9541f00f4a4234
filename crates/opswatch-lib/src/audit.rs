//! Audit persistence and notification seams
//!
//! Both interfaces are best-effort: callers log failures and continue,
//! and in-memory engine state stays authoritative either way.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::{AnomalyAlert, ResponseExecution};

/// Durable audit writes for alerts and executions
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn persist_alert(&self, alert: &AnomalyAlert) -> Result<()>;
    async fn persist_execution(&self, execution: &ResponseExecution) -> Result<()>;
}

/// Fire-and-forget dispatch to the notification sink
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_alert(&self, alert: &AnomalyAlert) -> Result<()>;
    async fn notify_execution(&self, execution: &ResponseExecution) -> Result<()>;
}

/// In-memory audit store; the daemon default and the test double
pub struct MemoryAuditStore {
    alerts: RwLock<Vec<AnomalyAlert>>,
    executions: RwLock<Vec<ResponseExecution>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(Vec::new()),
            executions: RwLock::new(Vec::new()),
        }
    }

    pub async fn alerts(&self) -> Vec<AnomalyAlert> {
        self.alerts.read().await.clone()
    }

    pub async fn executions(&self) -> Vec<ResponseExecution> {
        self.executions.read().await.clone()
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn persist_alert(&self, alert: &AnomalyAlert) -> Result<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }

    async fn persist_execution(&self, execution: &ResponseExecution) -> Result<()> {
        let mut executions = self.executions.write().await;
        // Executions mutate in place as they transition; keep the latest record
        if let Some(existing) = executions.iter_mut().find(|e| e.id == execution.id) {
            *existing = execution.clone();
        } else {
            executions.push(execution.clone());
        }
        Ok(())
    }
}

/// Notification sink that emits structured log events
pub struct LoggingNotifier;

#[async_trait]
impl NotificationSink for LoggingNotifier {
    async fn notify_alert(&self, alert: &AnomalyAlert) -> Result<()> {
        info!(
            event = "alert_notification",
            alert_id = %alert.id,
            metric = %alert.metric_name,
            severity = %alert.severity,
            message = %alert.message,
            "Alert dispatched"
        );
        Ok(())
    }

    async fn notify_execution(&self, execution: &ResponseExecution) -> Result<()> {
        info!(
            event = "execution_notification",
            execution_id = %execution.id,
            action = %execution.action_name,
            status = %execution.status,
            "Execution dispatched"
        );
        Ok(())
    }
}

/// Sink that swallows notifications; used in tests
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn notify_alert(&self, _alert: &AnomalyAlert) -> Result<()> {
        Ok(())
    }

    async fn notify_execution(&self, _execution: &ResponseExecution) -> Result<()> {
        Ok(())
    }
}
