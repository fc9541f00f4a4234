//! Monitoring engine
//!
//! Owns the poll loop: fetches snapshots from the metrics source, feeds
//! the history store, runs all detectors, applies per-metric cooldown and
//! the global rate limit, queues surviving alerts, and optionally hands
//! them to the response engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::audit::{AuditStore, NotificationSink};
use crate::detectors::{
    CorrelationDetector, Detector, PatternDetector, StatisticalDetector, ThresholdDetector,
};
use crate::history::MetricHistory;
use crate::models::{AnomalyAlert, MetricPoint, ResponseExecution};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::response::ResponseEngine;

use super::queue::AlertQueue;
use super::source::MetricsSource;

/// Bound on how long `stop()` waits for the loop to exit
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive poll failures before the health job re-arms the loop
const RESTART_FAILURE_THRESHOLD: u64 = 5;

/// Errors surfaced by the engine lifecycle
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("monitoring engine failed to start: {0}")]
    Startup(String),
}

/// Monitoring engine configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between poll cycles
    pub poll_interval: Duration,
    /// Window passed to the metrics source on each fetch
    pub metrics_window: Duration,
    /// Metric names evaluated each cycle
    pub monitored_metrics: Vec<String>,
    /// Sigma multiplier for the statistical detector
    pub statistical_threshold: f64,
    /// Sensitivity multiplier for the correlation rules
    pub correlation_threshold: f64,
    /// Points examined by the pattern detector
    pub pattern_window: usize,
    /// Growth ratio flagged by the pattern detector
    pub pattern_ratio: f64,
    /// Minimum time between alerts for the same metric
    pub cooldown: Duration,
    /// Global cap on alerts per minute
    pub max_alerts_per_minute: usize,
    /// Alert queue capacity
    pub queue_capacity: usize,
    /// Points retained per metric
    pub history_capacity: usize,
    /// Hand surviving alerts to the response engine
    pub enable_auto_response: bool,
    /// Interval for the secondary health-check job
    pub health_check_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            metrics_window: Duration::from_secs(300),
            monitored_metrics: vec![
                "avg_latency_ms".to_string(),
                "error_rate".to_string(),
                "total_cost".to_string(),
                "total_traces".to_string(),
                "success_rate".to_string(),
                "data_source_health".to_string(),
            ],
            statistical_threshold: 2.0,
            correlation_threshold: 1.0,
            pattern_window: 5,
            pattern_ratio: 3.0,
            cooldown: Duration::from_secs(300),
            max_alerts_per_minute: 10,
            queue_capacity: 1000,
            history_capacity: 500,
            enable_auto_response: true,
            health_check_interval: Duration::from_secs(300),
        }
    }
}

/// Serializable view of the configuration for status responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub poll_interval_seconds: u64,
    pub monitored_metrics: Vec<String>,
    pub statistical_threshold: f64,
    pub correlation_threshold: f64,
    pub max_alerts_per_minute: usize,
    pub cooldown_seconds: u64,
    pub enable_auto_response: bool,
}

impl MonitorConfig {
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            poll_interval_seconds: self.poll_interval.as_secs(),
            monitored_metrics: self.monitored_metrics.clone(),
            statistical_threshold: self.statistical_threshold,
            correlation_threshold: self.correlation_threshold,
            max_alerts_per_minute: self.max_alerts_per_minute,
            cooldown_seconds: self.cooldown.as_secs(),
            enable_auto_response: self.enable_auto_response,
        }
    }
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Stopped,
    Running,
}

/// Counters updated only by the poll loop, read via snapshot
#[derive(Debug, Default)]
struct EngineCounters {
    polls_completed: AtomicU64,
    poll_failures: AtomicU64,
    consecutive_failures: AtomicU64,
    alerts_detected: AtomicU64,
    suppressed_cooldown: AtomicU64,
    suppressed_rate_limit: AtomicU64,
    dropped_queue_full: AtomicU64,
    responses_triggered: AtomicU64,
    last_poll_unix: AtomicI64,
}

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStatistics {
    pub polls_completed: u64,
    pub poll_failures: u64,
    pub consecutive_failures: u64,
    pub alerts_detected: u64,
    pub alerts_suppressed_cooldown: u64,
    pub alerts_suppressed_rate_limit: u64,
    pub alerts_dropped_queue_full: u64,
    pub responses_triggered: u64,
    pub last_poll_unix: i64,
    pub queued_alerts: usize,
}

impl EngineCounters {
    fn snapshot(&self, queued_alerts: usize) -> MonitoringStatistics {
        MonitoringStatistics {
            polls_completed: self.polls_completed.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            alerts_detected: self.alerts_detected.load(Ordering::Relaxed),
            alerts_suppressed_cooldown: self.suppressed_cooldown.load(Ordering::Relaxed),
            alerts_suppressed_rate_limit: self.suppressed_rate_limit.load(Ordering::Relaxed),
            alerts_dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            responses_triggered: self.responses_triggered.load(Ordering::Relaxed),
            last_poll_unix: self.last_poll_unix.load(Ordering::Relaxed),
            queued_alerts,
        }
    }
}

/// Status response for the control surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub state: MonitorState,
    pub config: ConfigSummary,
    pub statistics: MonitoringStatistics,
}

/// Per-metric cooldown between successive alerts
///
/// Adapted alert-dedup cache: one entry per metric, applied across
/// detector types so a metric alerts at most once per window.
struct CooldownTracker {
    window: Duration,
    recent: RwLock<HashMap<String, Instant>>,
}

impl CooldownTracker {
    fn new(window: Duration) -> Self {
        Self {
            window,
            recent: RwLock::new(HashMap::new()),
        }
    }

    fn should_suppress(&self, metric: &str) -> bool {
        let recent = self.recent.read().unwrap();
        recent
            .get(metric)
            .map(|last| last.elapsed() < self.window)
            .unwrap_or(false)
    }

    fn record(&self, metric: &str) {
        let mut recent = self.recent.write().unwrap();
        recent.insert(metric.to_string(), Instant::now());
        let window = self.window;
        recent.retain(|_, last| last.elapsed() < window);
    }
}

/// Sliding one-minute alert budget
struct RateLimiter {
    max_per_minute: usize,
    emitted: std::collections::VecDeque<Instant>,
}

impl RateLimiter {
    fn new(max_per_minute: usize) -> Self {
        Self {
            max_per_minute,
            emitted: std::collections::VecDeque::new(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        let cutoff = Instant::now() - Duration::from_secs(60);
        while self.emitted.front().map(|t| *t < cutoff).unwrap_or(false) {
            self.emitted.pop_front();
        }
        if self.emitted.len() < self.max_per_minute {
            self.emitted.push_back(Instant::now());
            true
        } else {
            false
        }
    }
}

struct RunHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// The monitoring engine
pub struct MonitoringEngine {
    config: MonitorConfig,
    source: Arc<dyn MetricsSource>,
    history: Arc<MetricHistory>,
    detectors: Vec<Box<dyn Detector>>,
    responder: Option<Arc<ResponseEngine>>,
    queue: Arc<AlertQueue>,
    cooldowns: CooldownTracker,
    rate_limiter: StdMutex<RateLimiter>,
    counters: EngineCounters,
    audit: Arc<dyn AuditStore>,
    notifier: Arc<dyn NotificationSink>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    run_state: Mutex<Option<RunHandle>>,
}

impl MonitoringEngine {
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn MetricsSource>,
        responder: Option<Arc<ResponseEngine>>,
        audit: Arc<dyn AuditStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Arc<Self> {
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(StatisticalDetector::new(config.statistical_threshold)),
            Box::new(ThresholdDetector::with_default_rules()),
            Box::new(PatternDetector::new(config.pattern_window, config.pattern_ratio)),
            Box::new(CorrelationDetector::new(config.correlation_threshold)),
        ];

        Arc::new(Self {
            history: Arc::new(MetricHistory::with_capacity(config.history_capacity)),
            queue: Arc::new(AlertQueue::new(config.queue_capacity)),
            cooldowns: CooldownTracker::new(config.cooldown),
            rate_limiter: StdMutex::new(RateLimiter::new(config.max_alerts_per_minute)),
            counters: EngineCounters::default(),
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("monitor"),
            run_state: Mutex::new(None),
            detectors,
            config,
            source,
            responder,
            audit,
            notifier,
        })
    }

    /// Start the poll loop; no-op if already running
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut run_state = self.run_state.lock().await;
        if run_state.is_some() {
            debug!("Monitoring engine already running");
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            engine.run_loop(shutdown_rx).await;
        });

        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            auto_response = self.config.enable_auto_response,
            "Monitoring engine started"
        );
        *run_state = Some(RunHandle { shutdown_tx, task });
        Ok(())
    }

    /// Signal the loop to exit after the current cycle and wait, bounded
    pub async fn stop(&self) {
        let handle = self.run_state.lock().await.take();
        let Some(handle) = handle else {
            debug!("Monitoring engine already stopped");
            return;
        };

        let _ = handle.shutdown_tx.send(());
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle.task).await {
            Ok(_) => info!("Monitoring engine stopped"),
            Err(_) => warn!("Monitoring loop did not exit within shutdown timeout"),
        }
    }

    pub async fn state(&self) -> MonitorState {
        if self.run_state.lock().await.is_some() {
            MonitorState::Running
        } else {
            MonitorState::Stopped
        }
    }

    /// Best-effort status snapshot; never blocks on the poll loop
    pub async fn status(&self) -> MonitoringStatus {
        MonitoringStatus {
            state: self.state().await,
            config: self.config.summary(),
            statistics: self.counters.snapshot(self.queue.len()),
        }
    }

    pub fn recent_anomalies(&self, limit: usize) -> Vec<AnomalyAlert> {
        self.queue.recent(limit)
    }

    /// Drop queued alerts older than the given age; returns removed count
    pub fn clear_alerts(&self, older_than_minutes: i64) -> usize {
        let removed = self.queue.clear_older_than(older_than_minutes);
        self.metrics.set_queue_depth(self.queue.len() as i64);
        removed
    }

    pub fn history(&self) -> &Arc<MetricHistory> {
        &self.history
    }

    /// Manual trigger: run the response pipeline for an externally built alert
    pub async fn process_anomaly(&self, alert: &AnomalyAlert) -> Vec<ResponseExecution> {
        match &self.responder {
            Some(responder) => responder.process_anomaly(alert).await,
            None => Vec::new(),
        }
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut poll_ticker = interval(self.config.poll_interval);
        let mut health_ticker = interval(self.config.health_check_interval);
        // First tick of a tokio interval fires immediately; skip the
        // health check so it measures a real poll gap.
        health_ticker.tick().await;

        loop {
            tokio::select! {
                _ = poll_ticker.tick() => {
                    self.poll_cycle().await;
                }
                _ = health_ticker.tick() => {
                    if self.health_cycle() {
                        poll_ticker = interval(self.config.poll_interval);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Monitoring loop shutting down");
                    break;
                }
            }
        }
    }

    /// One poll cycle: fetch, append, detect, filter, queue, respond
    async fn poll_cycle(&self) {
        let start = Instant::now();

        let snapshot = match self.source.fetch(self.config.metrics_window).await {
            Ok(values) => values,
            Err(e) => {
                // Fail-open: skip this cycle, detection resumes next tick
                warn!(error = %e, "Metrics source fetch failed, skipping cycle");
                self.counters.poll_failures.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .consecutive_failures
                    .fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_poll_errors();
                return;
            }
        };
        self.counters.consecutive_failures.store(0, Ordering::Relaxed);

        let snapshot: HashMap<String, f64> = snapshot
            .into_iter()
            .filter(|(name, _)| self.config.monitored_metrics.contains(name))
            .collect();

        let now = chrono::Utc::now();
        let candidates = self.detect(&snapshot);

        // Candidates only score against history from previous cycles;
        // append the fresh points afterwards.
        for (name, value) in &snapshot {
            self.history.append(MetricPoint {
                timestamp: now,
                metric_name: name.clone(),
                value: *value,
                source: "poll".to_string(),
            });
        }

        for alert in candidates {
            self.admit_alert(alert).await;
        }

        self.counters.polls_completed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .last_poll_unix
            .store(now.timestamp(), Ordering::Relaxed);
        self.metrics.observe_poll_latency(start.elapsed().as_secs_f64());
        self.metrics.set_queue_depth(self.queue.len() as i64);
    }

    /// Run every detector, isolating failures per detector
    fn detect(&self, snapshot: &HashMap<String, f64>) -> Vec<AnomalyAlert> {
        let mut candidates = Vec::new();
        for detector in &self.detectors {
            match detector.detect(snapshot, &self.history) {
                Ok(alerts) => candidates.extend(alerts),
                Err(e) => {
                    warn!(detector = detector.name(), error = %e, "Detector failed");
                }
            }
        }
        candidates
    }

    /// Apply cooldown and rate limit, then queue, respond, persist, notify
    async fn admit_alert(&self, mut alert: AnomalyAlert) {
        if self.cooldowns.should_suppress(&alert.metric_name) {
            self.counters.suppressed_cooldown.fetch_add(1, Ordering::Relaxed);
            self.metrics.inc_suppressed("cooldown");
            debug!(metric = %alert.metric_name, "Alert suppressed by cooldown");
            return;
        }

        if !self.rate_limiter.lock().unwrap().try_acquire() {
            self.counters
                .suppressed_rate_limit
                .fetch_add(1, Ordering::Relaxed);
            self.metrics.inc_suppressed("rate_limit");
            warn!(metric = %alert.metric_name, "Alert suppressed by global rate limit");
            return;
        }

        self.cooldowns.record(&alert.metric_name);
        self.counters.alerts_detected.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_alerts(&alert.severity.to_string());
        self.logger.log_alert(&alert);

        if self.config.enable_auto_response {
            if let Some(responder) = &self.responder {
                let executions = responder.process_anomaly(&alert).await;
                alert.auto_response_triggered = true;
                alert.response_actions = executions.iter().map(|e| e.action_id).collect();
                self.counters
                    .responses_triggered
                    .fetch_add(executions.len() as u64, Ordering::Relaxed);
            }
        }

        if self.queue.push(alert.clone()) {
            self.counters.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
        }

        // Best-effort audit and notification; in-memory state is authoritative
        if let Err(e) = self.audit.persist_alert(&alert).await {
            warn!(alert_id = %alert.id, error = %e, "Failed to persist alert");
        }
        if let Err(e) = self.notifier.notify_alert(&alert).await {
            warn!(alert_id = %alert.id, error = %e, "Failed to notify alert");
        }
    }

    /// Secondary job: warn on stale polls or repeated failures.
    /// Returns true when the poll ticker should be re-armed.
    fn health_cycle(&self) -> bool {
        let last_poll = self.counters.last_poll_unix.load(Ordering::Relaxed);
        let consecutive = self.counters.consecutive_failures.load(Ordering::Relaxed);

        if last_poll > 0 {
            let age = chrono::Utc::now().timestamp() - last_poll;
            if age as u64 > 2 * self.config.poll_interval.as_secs() {
                warn!(
                    last_poll_age_secs = age,
                    "Last successful poll is stale"
                );
            }
        }

        if consecutive >= RESTART_FAILURE_THRESHOLD && consecutive % RESTART_FAILURE_THRESHOLD == 0
        {
            warn!(
                consecutive_failures = consecutive,
                "Repeated poll failures, re-arming poll ticker"
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryAuditStore, NoopNotifier};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetricsSource for FlakySource {
        async fn fetch(&self, _window: Duration) -> anyhow::Result<HashMap<String, f64>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                Err(anyhow!("source unreachable"))
            } else {
                Ok(HashMap::from([("error_rate".to_string(), 1.0)]))
            }
        }
    }

    fn engine_with(source: Arc<dyn MetricsSource>, config: MonitorConfig) -> Arc<MonitoringEngine> {
        MonitoringEngine::new(
            config,
            source,
            None,
            Arc::new(MemoryAuditStore::new()),
            Arc::new(NoopNotifier),
        )
    }

    fn quiet_snapshot() -> HashMap<String, f64> {
        HashMap::from([
            ("error_rate".to_string(), 1.0),
            ("avg_latency_ms".to_string(), 200.0),
        ])
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let source = Arc::new(super::super::source::StaticMetricsSource::new(quiet_snapshot()));
        let engine = engine_with(source, MonitorConfig::default());

        engine.start().await.unwrap();
        engine.start().await.unwrap();
        assert_eq!(engine.state().await, MonitorState::Running);

        engine.stop().await;
        assert_eq!(engine.state().await, MonitorState::Stopped);

        // stop on a stopped engine is a no-op
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_failed_fetch_skips_cycle() {
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });
        let engine = engine_with(source, MonitorConfig::default());

        engine.poll_cycle().await; // fails
        engine.poll_cycle().await; // succeeds

        let status = engine.status().await;
        assert_eq!(status.statistics.poll_failures, 1);
        assert_eq!(status.statistics.polls_completed, 1);
        assert_eq!(status.statistics.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_threshold_breach_queues_alert() {
        let source = Arc::new(super::super::source::StaticMetricsSource::new(
            HashMap::from([("error_rate".to_string(), 25.0)]),
        ));
        let engine = engine_with(source, MonitorConfig::default());

        engine.poll_cycle().await;

        let alerts = engine.recent_anomalies(10);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric_name, "error_rate");
        assert_eq!(alerts[0].severity, crate::models::Severity::Critical);
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat_alert() {
        let source = Arc::new(super::super::source::StaticMetricsSource::new(
            HashMap::from([("error_rate".to_string(), 25.0)]),
        ));
        let engine = engine_with(source, MonitorConfig::default());

        engine.poll_cycle().await;
        engine.poll_cycle().await;

        assert_eq!(engine.recent_anomalies(10).len(), 1);
        let status = engine.status().await;
        assert!(status.statistics.alerts_suppressed_cooldown >= 1);
    }

    #[tokio::test]
    async fn test_rate_limit_caps_alerts_per_minute() {
        let mut config = MonitorConfig::default();
        config.max_alerts_per_minute = 1;
        // Two different metrics breach; cooldown is per-metric so only the
        // global rate limit can suppress the second.
        let source = Arc::new(super::super::source::StaticMetricsSource::new(
            HashMap::from([
                ("error_rate".to_string(), 25.0),
                ("avg_latency_ms".to_string(), 6000.0),
            ]),
        ));
        let engine = engine_with(source, config);

        engine.poll_cycle().await;

        assert_eq!(engine.recent_anomalies(10).len(), 1);
        let status = engine.status().await;
        assert_eq!(status.statistics.alerts_suppressed_rate_limit, 1);
    }

    #[tokio::test]
    async fn test_clear_alerts_removes_old_entries() {
        let source = Arc::new(super::super::source::StaticMetricsSource::new(
            HashMap::from([("error_rate".to_string(), 25.0)]),
        ));
        let engine = engine_with(source, MonitorConfig::default());

        engine.poll_cycle().await;
        assert_eq!(engine.recent_anomalies(10).len(), 1);

        // Nothing is older than an hour yet
        assert_eq!(engine.clear_alerts(60), 0);
        // Everything is older than -1 minutes from now
        assert_eq!(engine.clear_alerts(-1), 1);
        assert!(engine.recent_anomalies(10).is_empty());
    }

    #[tokio::test]
    async fn test_alert_persisted_to_audit_store() {
        let audit = Arc::new(MemoryAuditStore::new());
        let source = Arc::new(super::super::source::StaticMetricsSource::new(
            HashMap::from([("error_rate".to_string(), 25.0)]),
        ));
        let engine = MonitoringEngine::new(
            MonitorConfig::default(),
            source,
            None,
            audit.clone(),
            Arc::new(NoopNotifier),
        );

        engine.poll_cycle().await;

        assert_eq!(audit.alerts().await.len(), 1);
    }

    #[test]
    fn test_rate_limiter_window() {
        let mut limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_cooldown_tracker() {
        let tracker = CooldownTracker::new(Duration::from_millis(50));
        assert!(!tracker.should_suppress("error_rate"));
        tracker.record("error_rate");
        assert!(tracker.should_suppress("error_rate"));
        assert!(!tracker.should_suppress("total_cost"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(!tracker.should_suppress("error_rate"));
    }
}
