//! Observability infrastructure
//!
//! Provides:
//! - Prometheus metrics (poll latency, alert/response counters, queue depth)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{AnomalyAlert, ResponseExecution, Severity};

/// Histogram buckets for poll-cycle latency (seconds)
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    poll_latency_seconds: Histogram,
    poll_errors_total: IntCounter,
    alerts_total: IntCounterVec,
    alerts_suppressed_total: IntCounterVec,
    responses_total: IntCounterVec,
    alert_queue_depth: IntGauge,
    pending_approvals: IntGauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            poll_latency_seconds: register_histogram!(
                "opswatch_poll_latency_seconds",
                "Time spent running one monitoring poll cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_latency_seconds"),

            poll_errors_total: register_int_counter!(
                "opswatch_poll_errors_total",
                "Total number of failed poll cycles"
            )
            .expect("Failed to register poll_errors_total"),

            alerts_total: register_int_counter_vec!(
                "opswatch_alerts_total",
                "Total number of alerts emitted, by severity",
                &["severity"]
            )
            .expect("Failed to register alerts_total"),

            alerts_suppressed_total: register_int_counter_vec!(
                "opswatch_alerts_suppressed_total",
                "Total number of alerts suppressed, by reason",
                &["reason"]
            )
            .expect("Failed to register alerts_suppressed_total"),

            responses_total: register_int_counter_vec!(
                "opswatch_responses_total",
                "Total number of response executions, by terminal status",
                &["status"]
            )
            .expect("Failed to register responses_total"),

            alert_queue_depth: register_int_gauge!(
                "opswatch_alert_queue_depth",
                "Number of alerts currently queued"
            )
            .expect("Failed to register alert_queue_depth"),

            pending_approvals: register_int_gauge!(
                "opswatch_pending_approvals",
                "Number of executions awaiting approval"
            )
            .expect("Failed to register pending_approvals"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying registry entries.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_poll_latency(&self, duration_secs: f64) {
        self.inner().poll_latency_seconds.observe(duration_secs);
    }

    pub fn inc_poll_errors(&self) {
        self.inner().poll_errors_total.inc();
    }

    pub fn inc_alerts(&self, severity: &str) {
        self.inner().alerts_total.with_label_values(&[severity]).inc();
    }

    pub fn inc_suppressed(&self, reason: &str) {
        self.inner()
            .alerts_suppressed_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_responses(&self, status: &str) {
        self.inner().responses_total.with_label_values(&[status]).inc();
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.inner().alert_queue_depth.set(depth);
    }

    pub fn set_pending_approvals(&self, count: i64) {
        self.inner().pending_approvals.set(count);
    }
}

/// Structured logger for pipeline events
///
/// Emits consistent JSON records for alerts, executions, approvals and
/// lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_alert(&self, alert: &AnomalyAlert) {
        if alert.severity >= Severity::High {
            warn!(
                event = "anomaly_detected",
                component = %self.component,
                alert_id = %alert.id,
                anomaly_type = %alert.anomaly_type,
                metric = %alert.metric_name,
                severity = %alert.severity,
                actual = alert.actual_value,
                expected = alert.expected_value,
                deviation = alert.deviation_score,
                "Anomaly detected"
            );
        } else {
            info!(
                event = "anomaly_detected",
                component = %self.component,
                alert_id = %alert.id,
                anomaly_type = %alert.anomaly_type,
                metric = %alert.metric_name,
                severity = %alert.severity,
                actual = alert.actual_value,
                expected = alert.expected_value,
                deviation = alert.deviation_score,
                "Anomaly detected"
            );
        }
    }

    pub fn log_execution(&self, execution: &ResponseExecution) {
        info!(
            event = "response_execution",
            component = %self.component,
            execution_id = %execution.id,
            anomaly_id = %execution.anomaly_id,
            action = %execution.action_name,
            handler = %execution.handler_id,
            status = %execution.status,
            duration_ms = execution.duration_ms(),
            "Response execution recorded"
        );
    }

    pub fn log_approval(&self, execution_id: uuid::Uuid, approved: bool, approver: &str) {
        info!(
            event = "approval_resolved",
            component = %self.component,
            execution_id = %execution_id,
            approved = approved,
            approver = %approver,
            "Approval resolved"
        );
    }

    pub fn log_rollback(&self, execution_id: uuid::Uuid, success: bool) {
        if success {
            info!(
                event = "rollback",
                component = %self.component,
                execution_id = %execution_id,
                "Execution rolled back"
            );
        } else {
            warn!(
                event = "rollback_failed",
                component = %self.component,
                execution_id = %execution_id,
                "Rollback failed"
            );
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "startup",
            component = %self.component,
            version = %version,
            "Started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "shutdown",
            component = %self.component,
            reason = %reason,
            "Shutting down"
        );
    }
}
