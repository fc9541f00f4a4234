//! Bounded alert queue
//!
//! Thread-safe FIFO between the poll loop and alert consumers. The
//! producer never blocks: when the queue is full the oldest unconsumed
//! alert is dropped with a warning.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

use crate::models::AnomalyAlert;

/// Bounded, drop-oldest FIFO of alerts
pub struct AlertQueue {
    alerts: Mutex<VecDeque<AnomalyAlert>>,
    capacity: usize,
}

impl AlertQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Push an alert; returns true if an older alert was dropped to make room
    pub fn push(&self, alert: AnomalyAlert) -> bool {
        let mut alerts = self.alerts.lock().unwrap();
        let mut dropped = false;
        while alerts.len() >= self.capacity {
            if let Some(old) = alerts.pop_front() {
                warn!(
                    alert_id = %old.id,
                    metric = %old.metric_name,
                    "Alert queue full, dropping oldest alert"
                );
                dropped = true;
            }
        }
        alerts.push_back(alert);
        dropped
    }

    /// Newest alerts first, up to `limit`
    pub fn recent(&self, limit: usize) -> Vec<AnomalyAlert> {
        let alerts = self.alerts.lock().unwrap();
        alerts.iter().rev().take(limit).cloned().collect()
    }

    /// Remove alerts older than the given age; returns how many were removed
    pub fn clear_older_than(&self, minutes: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::minutes(minutes);
        let mut alerts = self.alerts.lock().unwrap();
        let before = alerts.len();
        alerts.retain(|a| a.timestamp >= cutoff);
        before - alerts.len()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyType, Severity};

    fn alert(metric: &str) -> AnomalyAlert {
        AnomalyAlert::new(
            AnomalyType::Threshold,
            metric,
            Severity::Medium,
            10.0,
            5.0,
            2.0,
            "test alert",
            serde_json::Value::Null,
        )
    }

    #[test]
    fn test_push_and_recent_order() {
        let queue = AlertQueue::new(10);
        queue.push(alert("a"));
        queue.push(alert("b"));
        queue.push(alert("c"));

        let recent = queue.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].metric_name, "c");
        assert_eq!(recent[1].metric_name, "b");
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = AlertQueue::new(2);
        assert!(!queue.push(alert("a")));
        assert!(!queue.push(alert("b")));
        assert!(queue.push(alert("c")));

        assert_eq!(queue.len(), 2);
        let recent = queue.recent(10);
        assert_eq!(recent[0].metric_name, "c");
        assert_eq!(recent[1].metric_name, "b");
    }

    #[test]
    fn test_clear_older_than() {
        let queue = AlertQueue::new(10);
        let mut old = alert("a");
        old.timestamp = Utc::now() - chrono::Duration::minutes(30);
        queue.push(old);
        queue.push(alert("b"));

        let removed = queue.clear_older_than(10);
        assert_eq!(removed, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.recent(10)[0].metric_name, "b");
    }
}
