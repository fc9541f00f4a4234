//! Monitoring engine and its collaborators
//!
//! The engine owns the poll loop that drives detection: it is the only
//! writer of the metric history store, and the only producer on the
//! alert queue.

mod engine;
mod queue;
mod source;

pub use engine::{
    ConfigSummary, EngineError, MonitorConfig, MonitorState, MonitoringEngine,
    MonitoringStatistics, MonitoringStatus,
};
pub use queue::AlertQueue;
pub use source::{MetricsSource, StaticMetricsSource};
