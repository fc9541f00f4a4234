//! External metrics source interface

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for pulling current metric values from an external source
///
/// Implementations must be safe to call repeatedly. A failed fetch returns
/// an error, never a partial snapshot; the monitoring engine skips that
/// cycle and tries again on the next tick.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch current values for the monitored metric set over the window
    async fn fetch(&self, window: Duration) -> Result<HashMap<String, f64>>;
}

/// A source backed by a fixed snapshot, for wiring and tests
pub struct StaticMetricsSource {
    values: HashMap<String, f64>,
}

impl StaticMetricsSource {
    pub fn new(values: HashMap<String, f64>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl MetricsSource for StaticMetricsSource {
    async fn fetch(&self, _window: Duration) -> Result<HashMap<String, f64>> {
        Ok(self.values.clone())
    }
}
