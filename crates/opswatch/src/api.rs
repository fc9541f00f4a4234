//! HTTP control surface: health probes, Prometheus metrics, and the
//! monitoring/response management endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use opswatch_lib::health::{ComponentStatus, HealthRegistry};
use opswatch_lib::models::{AnomalyAlert, AnomalyType, Severity};
use opswatch_lib::monitor::MonitoringEngine;
use opswatch_lib::response::ResponseEngine;
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub engine: Arc<MonitoringEngine>,
    pub responder: Arc<ResponseEngine>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        engine: Arc<MonitoringEngine>,
        responder: Arc<ResponseEngine>,
    ) -> Self {
        Self {
            health_registry,
            engine,
            responder,
        }
    }
}

/// Returns 200 while operational, 503 once any component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn start_monitoring(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.start().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "state": "running" }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

async fn stop_monitoring(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.engine.stop().await;
    (StatusCode::OK, Json(json!({ "state": "stopped" })))
}

async fn monitoring_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.status().await)
}

#[derive(Debug, Deserialize)]
struct AnomalyListQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn list_anomalies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnomalyListQuery>,
) -> impl IntoResponse {
    Json(state.engine.recent_anomalies(query.limit))
}

#[derive(Debug, Deserialize)]
struct ClearQuery {
    #[serde(default)]
    older_than_minutes: i64,
}

async fn clear_anomalies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClearQuery>,
) -> impl IntoResponse {
    let removed = state.engine.clear_alerts(query.older_than_minutes);
    Json(json!({ "removed": removed }))
}

/// Manual anomaly submission for the response pipeline
#[derive(Debug, Deserialize)]
struct ProcessRequest {
    anomaly_type: AnomalyType,
    metric_name: String,
    severity: Severity,
    actual_value: f64,
    expected_value: f64,
    #[serde(default)]
    deviation_score: f64,
    #[serde(default)]
    message: String,
}

async fn process_anomaly(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessRequest>,
) -> impl IntoResponse {
    let alert = AnomalyAlert::new(
        request.anomaly_type,
        request.metric_name,
        request.severity,
        request.actual_value,
        request.expected_value,
        request.deviation_score,
        request.message,
        serde_json::Value::Null,
    );

    let executions = state.engine.process_anomaly(&alert).await;
    Json(json!({ "alert_id": alert.id, "executions": executions }))
}

async fn list_approvals(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.responder.pending_approvals().await)
}

#[derive(Debug, Deserialize)]
struct ApprovalDecision {
    approved: bool,
    #[serde(default = "default_approver")]
    approver: String,
}

fn default_approver() -> String {
    "api".to_string()
}

async fn resolve_approval(
    State(state): State<Arc<AppState>>,
    Path(execution_id): Path<Uuid>,
    Json(decision): Json<ApprovalDecision>,
) -> impl IntoResponse {
    let resolved = state
        .responder
        .approve_pending_action(execution_id, decision.approved, &decision.approver)
        .await;

    if resolved {
        let execution = state.responder.execution(execution_id).await;
        (StatusCode::OK, Json(json!({ "execution": execution })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no pending approval for execution" })),
        )
    }
}

async fn rollback_execution(
    State(state): State<Arc<AppState>>,
    Path(execution_id): Path<Uuid>,
) -> impl IntoResponse {
    if state.responder.rollback_execution(execution_id).await {
        let execution = state.responder.execution(execution_id).await;
        (StatusCode::OK, Json(json!({ "execution": execution })))
    } else {
        (
            StatusCode::CONFLICT,
            Json(json!({ "error": "execution is not in a rollback-eligible state" })),
        )
    }
}

async fn response_statistics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.responder.statistics().await)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/monitoring/start", post(start_monitoring))
        .route("/monitoring/stop", post(stop_monitoring))
        .route("/monitoring/status", get(monitoring_status))
        .route("/anomalies", get(list_anomalies).delete(clear_anomalies))
        .route("/anomalies/process", post(process_anomaly))
        .route("/approvals", get(list_approvals))
        .route("/approvals/:execution_id", post(resolve_approval))
        .route(
            "/executions/:execution_id/rollback",
            post(rollback_execution),
        )
        .route("/responses/statistics", get(response_statistics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
