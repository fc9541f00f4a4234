//! Daemon configuration

use std::time::Duration;

use anyhow::Result;
use opswatch_lib::monitor::MonitorConfig;
use serde::Deserialize;

/// Daemon configuration, loaded from `OPSWATCH_`-prefixed environment
/// variables with sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// API server port for the control surface and probes
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Interval between poll cycles in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Window passed to the metrics source on each fetch, in seconds
    #[serde(default = "default_metrics_window")]
    pub metrics_window_seconds: u64,

    /// Comma-separated metric names to evaluate; empty means the defaults
    #[serde(default)]
    pub monitored_metrics: String,

    /// Sigma multiplier for the statistical detector
    #[serde(default = "default_statistical_threshold")]
    pub statistical_threshold: f64,

    /// Sensitivity multiplier for the correlation rules
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,

    /// Minimum seconds between alerts for the same metric
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,

    /// Global cap on alerts per minute
    #[serde(default = "default_max_alerts")]
    pub max_alerts_per_minute: usize,

    /// Hand surviving alerts to the response engine
    #[serde(default = "default_enable_auto_response")]
    pub enable_auto_response: bool,
}

fn default_api_port() -> u16 {
    8080
}

fn default_poll_interval() -> u64 {
    30
}

fn default_metrics_window() -> u64 {
    300
}

fn default_statistical_threshold() -> f64 {
    2.0
}

fn default_correlation_threshold() -> f64 {
    1.0
}

fn default_cooldown() -> u64 {
    300
}

fn default_max_alerts() -> usize {
    10
}

fn default_enable_auto_response() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            poll_interval_seconds: default_poll_interval(),
            metrics_window_seconds: default_metrics_window(),
            monitored_metrics: String::new(),
            statistical_threshold: default_statistical_threshold(),
            correlation_threshold: default_correlation_threshold(),
            cooldown_seconds: default_cooldown(),
            max_alerts_per_minute: default_max_alerts(),
            enable_auto_response: default_enable_auto_response(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("OPSWATCH"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }

    /// Translate into the monitor engine's configuration
    pub fn monitor_config(&self) -> MonitorConfig {
        let mut config = MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            metrics_window: Duration::from_secs(self.metrics_window_seconds),
            statistical_threshold: self.statistical_threshold,
            correlation_threshold: self.correlation_threshold,
            cooldown: Duration::from_secs(self.cooldown_seconds),
            max_alerts_per_minute: self.max_alerts_per_minute,
            enable_auto_response: self.enable_auto_response,
            ..MonitorConfig::default()
        };

        let metrics: Vec<String> = self
            .monitored_metrics
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !metrics.is_empty() {
            config.monitored_metrics = metrics;
        }
        config
    }
}
