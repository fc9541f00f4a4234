//! Opswatch - real-time anomaly detection and automated response daemon
//!
//! Polls operational metrics, detects anomalies with a battery of
//! detectors, and remediates through approval-gated response handlers.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use opswatch_lib::audit::{LoggingNotifier, MemoryAuditStore};
use opswatch_lib::health::{components, HealthRegistry};
use opswatch_lib::monitor::{MonitoringEngine, StaticMetricsSource};
use opswatch_lib::observability::StructuredLogger;
use opswatch_lib::response::{default_handlers, ResponseEngine};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nominal metric values served until a real source is wired in
fn demo_snapshot() -> HashMap<String, f64> {
    HashMap::from([
        ("avg_latency_ms".to_string(), 250.0),
        ("error_rate".to_string(), 1.5),
        ("total_cost".to_string(), 12.0),
        ("total_traces".to_string(), 900.0),
        ("success_rate".to_string(), 98.5),
        ("data_source_health".to_string(), 1.0),
    ])
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting opswatch");

    let config = config::DaemonConfig::load()?;
    info!(
        api_port = config.api_port,
        poll_interval_seconds = config.poll_interval_seconds,
        auto_response = config.enable_auto_response,
        "Daemon configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MONITOR).await;
    health_registry.register(components::RESPONDER).await;
    health_registry.register(components::METRICS_SOURCE).await;
    health_registry.register(components::AUDIT).await;

    let logger = StructuredLogger::new("daemon");
    logger.log_startup(VERSION);

    // Wire the pipeline: source -> monitor -> responder, shared audit trail
    let audit = Arc::new(MemoryAuditStore::new());
    let notifier = Arc::new(LoggingNotifier);
    let responder = ResponseEngine::new(default_handlers(), audit.clone(), notifier.clone());
    let source = Arc::new(StaticMetricsSource::new(demo_snapshot()));
    let engine = MonitoringEngine::new(
        config.monitor_config(),
        source,
        Some(responder.clone()),
        audit,
        notifier,
    );

    engine.start().await?;
    health_registry.set_ready(true).await;

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        engine.clone(),
        responder,
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    engine.stop().await;
    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
