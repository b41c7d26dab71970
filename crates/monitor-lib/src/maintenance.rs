//! Background maintenance loop
//!
//! Periodically prunes stale anomalies, auto-resolves alerts whose
//! condition has cleared and, when configured, evicts old terminal alerts.
//! Each step is isolated: a panicking step is logged and the loop keeps
//! ticking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::alerting::AlertStore;
use crate::anomaly::AnomalyLog;
use crate::buffer::BufferRegistry;
use crate::config::EngineConfig;
use crate::health::{components, HealthRegistry};
use crate::models::Alert;
use crate::observability::{MonitorMetrics, StructuredLogger};

/// Configuration for the maintenance loop
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Tick interval (default: 10 seconds)
    pub interval: Duration,
    /// Anomalies older than this are pruned (default: 2 hours)
    pub anomaly_retention: Duration,
    /// Active alerts younger than this are never auto-resolved (default: 1 hour)
    pub auto_resolve_after: Duration,
    /// Recent points averaged for auto-resolution
    pub auto_resolve_samples: usize,
    /// Mean must fall below `threshold_value * ratio`
    pub auto_resolve_ratio: f64,
    /// Terminal alert retention, `None` to keep forever
    pub alert_retention: Option<Duration>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for MaintenanceConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            interval: config.maintenance_interval,
            anomaly_retention: config.anomaly_retention,
            auto_resolve_after: config.auto_resolve_after,
            auto_resolve_samples: config.auto_resolve_samples,
            auto_resolve_ratio: config.auto_resolve_ratio,
            alert_retention: config.alert_retention,
        }
    }
}

/// Summary of one maintenance tick
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub anomalies_pruned: usize,
    pub alerts_auto_resolved: Vec<Alert>,
    pub alerts_evicted: usize,
    /// Steps that failed, with their failure message
    pub errors: Vec<(&'static str, String)>,
}

impl MaintenanceReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Periodic cleanup over the shared engine state
pub struct MaintenanceLoop {
    buffers: Arc<BufferRegistry>,
    alerts: Arc<AlertStore>,
    anomalies: Arc<AnomalyLog>,
    config: MaintenanceConfig,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl MaintenanceLoop {
    pub fn new(
        buffers: Arc<BufferRegistry>,
        alerts: Arc<AlertStore>,
        anomalies: Arc<AnomalyLog>,
        config: MaintenanceConfig,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Self {
        Self {
            buffers,
            alerts,
            anomalies,
            config,
            metrics: MonitorMetrics::new(),
            logger,
            health,
        }
    }

    /// Tick until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting maintenance loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so a fresh engine
        // is not swept before any data arrives.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down maintenance loop");
                    break;
                }
            }
        }
    }

    /// Run one tick now, recording metrics and health
    pub async fn tick(&self) -> MaintenanceReport {
        let start = Instant::now();
        let report = self.tick_at(Utc::now());

        self.metrics
            .observe_maintenance_latency(start.elapsed().as_secs_f64());
        self.metrics.set_active_alerts(self.alerts.counts().active);
        self.metrics.set_tracked_buffers(self.buffers.len());

        if report.is_clean() {
            self.health.set_healthy(components::MAINTENANCE).await;
        } else {
            let failed: Vec<&str> = report.errors.iter().map(|(step, _)| *step).collect();
            self.health
                .set_degraded(
                    components::MAINTENANCE,
                    format!("failed steps: {}", failed.join(", ")),
                )
                .await;
        }

        report
    }

    /// Run every step against the given clock
    pub fn tick_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.run_step("anomaly_pruning", || {
            self.anomalies.prune(self.config.anomaly_retention, now)
        }) {
            Ok(pruned) => report.anomalies_pruned = pruned,
            Err(e) => report.errors.push(("anomaly_pruning", e)),
        }

        match self.run_step("auto_resolution", || self.auto_resolve(now)) {
            Ok(resolved) => report.alerts_auto_resolved = resolved,
            Err(e) => report.errors.push(("auto_resolution", e)),
        }

        if let Some(retention) = self.config.alert_retention {
            match self.run_step("alert_eviction", || {
                self.alerts.evict_terminal(retention, now)
            }) {
                Ok(evicted) => report.alerts_evicted = evicted,
                Err(e) => report.errors.push(("alert_eviction", e)),
            }
        }

        for alert in &report.alerts_auto_resolved {
            self.metrics.inc_alerts_resolved();
            self.logger.log_alert_resolved(alert, true);
        }
        self.logger.log_maintenance(
            report.anomalies_pruned,
            report.alerts_auto_resolved.len(),
            report.alerts_evicted,
            report.errors.len(),
        );

        report
    }

    fn run_step<T>(&self, step: &'static str, f: impl FnOnce() -> T) -> Result<T, String> {
        catch_unwind(AssertUnwindSafe(f)).map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            self.metrics.inc_maintenance_failures();
            error!(step, error = %message, "Maintenance step failed");
            message
        })
    }

    /// Resolve ACTIVE alerts whose recent mean has recovered.
    ///
    /// Works on a snapshot so no lock is held across the whole store.
    fn auto_resolve(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let candidates = self
            .alerts
            .active_older_than(self.config.auto_resolve_after, now);
        let mut resolved = Vec::new();

        for alert in candidates {
            if !alert.metric.lower_is_better() {
                continue;
            }

            let mean = self
                .buffers
                .with_buffer(alert.metric, &alert.source, |b| {
                    b.recent_mean(self.config.auto_resolve_samples)
                })
                .flatten();

            let Some(mean) = mean else {
                continue;
            };

            if mean < alert.threshold_value * self.config.auto_resolve_ratio {
                match self.alerts.auto_resolve(&alert.id, now) {
                    Ok(alert) => resolved.push(alert),
                    Err(e) => {
                        // Acknowledged or resolved concurrently
                        debug!(alert_id = %alert.id, error = %e, "Skipping auto-resolution");
                    }
                }
            }
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertDraft, AUTO_RESOLVE_ACTOR};
    use crate::models::{
        AlertOrigin, AlertSeverity, AlertStatus, Metadata, MetricDataPoint, MetricKind,
    };

    struct Fixture {
        buffers: Arc<BufferRegistry>,
        alerts: Arc<AlertStore>,
        anomalies: Arc<AnomalyLog>,
        maintenance: MaintenanceLoop,
    }

    fn fixture(config: MaintenanceConfig) -> Fixture {
        let buffers = Arc::new(BufferRegistry::default());
        let alerts = Arc::new(AlertStore::new());
        let anomalies = Arc::new(AnomalyLog::new());
        let maintenance = MaintenanceLoop::new(
            buffers.clone(),
            alerts.clone(),
            anomalies.clone(),
            config,
            StructuredLogger::new("test"),
            HealthRegistry::new(),
        );
        Fixture {
            buffers,
            alerts,
            anomalies,
            maintenance,
        }
    }

    fn old_alert(store: &AlertStore, metric: MetricKind, threshold: f64) -> String {
        let draft = AlertDraft {
            severity: AlertSeverity::Critical,
            title: "test".to_string(),
            description: "test".to_string(),
            metric,
            source: "svc".to_string(),
            current_value: threshold * 2.0,
            threshold_value: threshold,
            origin: AlertOrigin::Threshold,
            metadata: Metadata::new(),
        };
        store
            .create_at(draft, Utc::now() - chrono::Duration::minutes(90))
            .alert()
            .id
            .clone()
    }

    fn feed(buffers: &BufferRegistry, metric: MetricKind, value: f64, count: usize) {
        for _ in 0..count {
            buffers.ingest(MetricDataPoint::new(metric, value, "svc"));
        }
    }

    #[test]
    fn test_auto_resolves_recovered_alert() {
        let f = fixture(MaintenanceConfig::default());
        let id = old_alert(&f.alerts, MetricKind::ResponseTime, 2000.0);
        feed(&f.buffers, MetricKind::ResponseTime, 1500.0, 10);

        let report = f.maintenance.tick_at(Utc::now());

        assert_eq!(report.alerts_auto_resolved.len(), 1);
        let alert = f.alerts.get(&id).unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolved_by.as_deref(), Some(AUTO_RESOLVE_ACTOR));
    }

    #[test]
    fn test_keeps_alert_above_recovery_bar() {
        let f = fixture(MaintenanceConfig::default());
        let id = old_alert(&f.alerts, MetricKind::ResponseTime, 2000.0);
        feed(&f.buffers, MetricKind::ResponseTime, 1900.0, 10);

        let report = f.maintenance.tick_at(Utc::now());

        assert!(report.alerts_auto_resolved.is_empty());
        assert_eq!(f.alerts.get(&id).unwrap().status, AlertStatus::Active);
    }

    #[test]
    fn test_young_alert_not_auto_resolved() {
        let f = fixture(MaintenanceConfig::default());
        let draft = AlertDraft {
            severity: AlertSeverity::High,
            title: "test".to_string(),
            description: "test".to_string(),
            metric: MetricKind::ErrorRate,
            source: "svc".to_string(),
            current_value: 3.0,
            threshold_value: 2.0,
            origin: AlertOrigin::Threshold,
            metadata: Metadata::new(),
        };
        let id = f.alerts.create(draft).alert().id.clone();
        feed(&f.buffers, MetricKind::ErrorRate, 0.1, 10);

        f.maintenance.tick_at(Utc::now());

        assert_eq!(f.alerts.get(&id).unwrap().status, AlertStatus::Active);
    }

    #[test]
    fn test_higher_is_better_metrics_never_auto_resolved() {
        let f = fixture(MaintenanceConfig::default());
        let id = old_alert(&f.alerts, MetricKind::CpuUsage, 90.0);
        feed(&f.buffers, MetricKind::CpuUsage, 10.0, 10);

        f.maintenance.tick_at(Utc::now());

        assert_eq!(f.alerts.get(&id).unwrap().status, AlertStatus::Active);
    }

    #[test]
    fn test_alert_without_buffer_left_alone() {
        let f = fixture(MaintenanceConfig::default());
        let id = old_alert(&f.alerts, MetricKind::ResponseTime, 2000.0);

        let report = f.maintenance.tick_at(Utc::now());

        assert!(report.is_clean());
        assert_eq!(f.alerts.get(&id).unwrap().status, AlertStatus::Active);
    }

    #[test]
    fn test_eviction_only_when_configured() {
        let f = fixture(MaintenanceConfig::default());
        let id = old_alert(&f.alerts, MetricKind::ResponseTime, 2000.0);
        f.alerts
            .auto_resolve(&id, Utc::now() - chrono::Duration::hours(48))
            .unwrap();

        assert_eq!(f.maintenance.tick_at(Utc::now()).alerts_evicted, 0);
        assert!(f.alerts.get(&id).is_some());

        let g = fixture(MaintenanceConfig {
            alert_retention: Some(Duration::from_secs(24 * 3600)),
            ..MaintenanceConfig::default()
        });
        let id = old_alert(&g.alerts, MetricKind::ResponseTime, 2000.0);
        g.alerts
            .auto_resolve(&id, Utc::now() - chrono::Duration::hours(48))
            .unwrap();

        assert_eq!(g.maintenance.tick_at(Utc::now()).alerts_evicted, 1);
        assert!(g.alerts.get(&id).is_none());
        assert!(g.anomalies.is_empty());
    }

    #[test]
    fn test_panicking_step_is_isolated() {
        let f = fixture(MaintenanceConfig::default());
        let result: Result<(), String> =
            f.maintenance.run_step("boom", || panic!("step exploded"));
        assert_eq!(result.unwrap_err(), "step exploded");

        // Subsequent ticks still run normally.
        assert!(f.maintenance.tick_at(Utc::now()).is_clean());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let f = fixture(MaintenanceConfig {
            interval: Duration::from_millis(10),
            ..MaintenanceConfig::default()
        });
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(f.maintenance.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
