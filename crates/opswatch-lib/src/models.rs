//! Core data models for the anomaly detection and response pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single observed metric value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    pub value: f64,
    pub source: String,
}

/// Which detection strategy produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Statistical,
    Threshold,
    Pattern,
    Correlation,
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyType::Statistical => write!(f, "statistical"),
            AnomalyType::Threshold => write!(f, "threshold"),
            AnomalyType::Pattern => write!(f, "pattern"),
            AnomalyType::Correlation => write!(f, "correlation"),
        }
    }
}

/// Alert severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// An anomaly classified by one of the detectors
///
/// Logically immutable once built; only the two response-tracking fields
/// (`auto_response_triggered`, `response_actions`) are filled in later by
/// the response engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub anomaly_type: AnomalyType,
    pub metric_name: String,
    pub severity: Severity,
    pub actual_value: f64,
    pub expected_value: f64,
    pub deviation_score: f64,
    pub message: String,
    pub context_data: serde_json::Value,
    pub auto_response_triggered: bool,
    pub response_actions: Vec<Uuid>,
}

impl AnomalyAlert {
    /// Build a new alert with a fresh id and empty response tracking
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        anomaly_type: AnomalyType,
        metric_name: impl Into<String>,
        severity: Severity,
        actual_value: f64,
        expected_value: f64,
        deviation_score: f64,
        message: impl Into<String>,
        context_data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            anomaly_type,
            metric_name: metric_name.into(),
            severity,
            actual_value,
            expected_value,
            deviation_score,
            message: message.into(),
            context_data,
            auto_response_triggered: false,
            response_actions: Vec::new(),
        }
    }
}

/// A remediation action proposed by a response handler
///
/// Stateless template, not an event: the same action shape may be proposed
/// for many alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseAction {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub handler_id: String,
    pub requires_approval: bool,
    pub params: serde_json::Value,
}

impl ResponseAction {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler_id: impl Into<String>,
        requires_approval: bool,
        params: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            handler_id: handler_id.into(),
            requires_approval,
            params,
        }
    }
}

/// Lifecycle state of a response execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Executing,
    Success,
    Failed,
    RequiresApproval,
    RolledBack,
}

impl ExecutionStatus {
    /// Terminal states admit no further transitions (except Success -> RolledBack)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::RolledBack
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Executing => write!(f, "executing"),
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::RequiresApproval => write!(f, "requires_approval"),
            ExecutionStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Expected effect of an executed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAssessment {
    pub expected_improvement: String,
    pub estimated_resolution_minutes: u32,
}

/// Record of one action dispatched for one anomaly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseExecution {
    pub id: Uuid,
    pub anomaly_id: Uuid,
    pub action_id: Uuid,
    pub action_name: String,
    pub handler_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_data: serde_json::Value,
    pub impact_assessment: Option<ImpactAssessment>,
    pub rollback_executed: bool,
}

impl ResponseExecution {
    pub fn new(anomaly_id: Uuid, action: &ResponseAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            anomaly_id,
            action_id: action.id,
            action_name: action.name.clone(),
            handler_id: action.handler_id.clone(),
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            result_data: serde_json::Value::Null,
            impact_assessment: None,
            rollback_executed: false,
        }
    }

    /// Wall-clock duration, once completed
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}

/// An action awaiting human sign-off
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub execution_id: Uuid,
    pub action_name: String,
    pub action_description: String,
    pub anomaly_severity: Severity,
    pub requested_at: DateTime<Utc>,
}
