//! Library for real-time metric anomaly detection and automated response
//!
//! This crate provides the core functionality for:
//! - Bounded per-metric history of observed values
//! - Statistical, threshold, pattern and correlation detectors
//! - A polling monitor engine with cooldown and rate limiting
//! - Automated response handlers with approval gating and rollback
//! - Health checks and observability

pub mod audit;
pub mod detectors;
pub mod health;
pub mod history;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod response;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use history::MetricHistory;
pub use models::*;
pub use monitor::{MonitorConfig, MonitoringEngine, MonitoringStatus};
pub use observability::{EngineMetrics, StructuredLogger};
pub use response::{ResponseEngine, ResponseHandler, ResponseStatistics};
