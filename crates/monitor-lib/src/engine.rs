//! The monitoring engine service
//!
//! A single `MonitoringEngine` is constructed at process start and shared
//! by handle with every call site. It owns the metric buffers, the alert
//! store and the anomaly log, runs detection on every ingested point, and
//! drives the background maintenance loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::alerting::{
    AlertCounts, AlertDraft, AlertStore, CreateOutcome, FanoutReport, Subscribers,
    SubscriptionId, ThresholdAlerter, ThresholdBreach,
};
use crate::anomaly::{AnomalyDetector, AnomalyLog};
use crate::buffer::BufferRegistry;
use crate::config::EngineConfig;
use crate::error::{MonitorError, Result};
use crate::health::{components, HealthRegistry};
use crate::maintenance::{MaintenanceConfig, MaintenanceLoop, MaintenanceReport};
use crate::models::{
    Alert, AlertOrigin, AlertSeverity, Anomaly, Metadata, MetricDataPoint, MetricKind,
};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sla::{
    merge_evaluations, overall_state, PerformanceSla, SlaEvaluator, SlaStatus, SlaViolation,
};
use crate::system::SystemMetricsSource;

/// Snapshot of engine counters for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStats {
    pub tracked_buffers: usize,
    pub buffered_points: usize,
    pub points_ingested: u64,
    pub alerts: AlertCounts,
    pub anomalies: usize,
    pub alert_subscribers: usize,
    pub anomaly_subscribers: usize,
    pub active_slas: usize,
    pub maintenance_running: bool,
}

struct MaintenanceHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Real-time metrics monitoring and alerting engine
pub struct MonitoringEngine {
    config: EngineConfig,
    buffers: Arc<BufferRegistry>,
    alerts: Arc<AlertStore>,
    anomalies: Arc<AnomalyLog>,
    detector: AnomalyDetector,
    sla_evaluator: SlaEvaluator,
    threshold_alerter: ThresholdAlerter,
    alert_subscribers: Subscribers<Alert>,
    anomaly_subscribers: Subscribers<Anomaly>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
    points_ingested: AtomicU64,
    maintenance_running: AtomicBool,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl MonitoringEngine {
    /// Build an engine. Nothing runs in the background until [`start`](Self::start).
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Self::with_instance(config, "metrics-monitor", HealthRegistry::new())
    }

    /// Build an engine that logs under `instance` and reports into `health`
    pub fn with_instance(
        config: EngineConfig,
        instance: impl Into<String>,
        health: HealthRegistry,
    ) -> Arc<Self> {
        let logger = StructuredLogger::new(instance);
        Arc::new(Self {
            buffers: Arc::new(BufferRegistry::new(config.buffer_capacity)),
            alerts: Arc::new(AlertStore::new()),
            anomalies: Arc::new(AnomalyLog::new()),
            detector: AnomalyDetector::new(
                config.anomaly_min_samples,
                config.anomaly_baseline_size,
            ),
            sla_evaluator: SlaEvaluator::new(config.sla_min_samples),
            threshold_alerter: ThresholdAlerter::new(config.thresholds.clone()),
            alert_subscribers: Subscribers::new("alerts", logger.clone()),
            anomaly_subscribers: Subscribers::new("anomalies", logger.clone()),
            metrics: MonitorMetrics::new(),
            logger,
            health,
            points_ingested: AtomicU64::new(0),
            maintenance_running: AtomicBool::new(false),
            maintenance: Mutex::new(None),
            config,
        })
    }

    /// Spawn the maintenance loop on the current tokio runtime.
    ///
    /// Returns false if it was already running.
    pub async fn start(&self) -> bool {
        let mut slot = self.maintenance.lock().await;
        if slot.is_some() {
            return false;
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let maintenance = MaintenanceLoop::new(
            self.buffers.clone(),
            self.alerts.clone(),
            self.anomalies.clone(),
            MaintenanceConfig::from(&self.config),
            self.logger.clone(),
            self.health.clone(),
        );
        let task = tokio::spawn(maintenance.run(shutdown_rx));
        *slot = Some(MaintenanceHandle { shutdown_tx, task });

        self.maintenance_running.store(true, Ordering::SeqCst);
        self.health.register(components::ENGINE).await;
        self.health.register(components::MAINTENANCE).await;
        self.health.set_ready(true).await;
        self.logger.log_startup(env!("CARGO_PKG_VERSION"));
        true
    }

    /// Stop the maintenance loop and wait for it to exit
    pub async fn shutdown(&self) {
        let handle = self.maintenance.lock().await.take();
        let Some(handle) = handle else {
            return;
        };

        self.logger.log_shutdown("shutdown requested");
        // An error means the loop already exited.
        let _ = handle.shutdown_tx.send(());
        if let Err(e) = handle.task.await {
            warn!(error = %e, "Maintenance loop ended abnormally");
        }

        self.maintenance_running.store(false, Ordering::SeqCst);
        self.health.set_ready(false).await;
        self.health
            .set_unhealthy(components::MAINTENANCE, "maintenance loop stopped")
            .await;
    }

    /// Record a measurement stamped with the current time
    pub fn ingest_metric(
        &self,
        metric: MetricKind,
        value: f64,
        source: impl Into<String>,
        metadata: Option<Metadata>,
    ) {
        let mut point = MetricDataPoint::new(metric, value, source);
        point.metadata = metadata;
        self.ingest_point(point);
    }

    /// Record a measurement and run every detection path over it.
    ///
    /// Never fails; detections without enough data are skipped.
    pub fn ingest_point(&self, point: MetricDataPoint) {
        let now = Utc::now();
        let metric = point.metric;
        let source = point.source.clone();
        let value = point.value;
        let breach = self.threshold_alerter.check(&point);

        let (anomaly, violations) = self.buffers.ingest_with(point, |buffer, current| {
            let anomaly = self.detector.detect(buffer, current);
            let violations = self
                .sla_evaluator
                .evaluate(&self.config.slas, metric, buffer, now);
            (anomaly, violations)
        });

        self.points_ingested.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_points_ingested();
        self.metrics.set_tracked_buffers(self.buffers.len());

        if let Some(anomaly) = anomaly {
            self.handle_anomaly(anomaly);
        }

        for violation in violations {
            self.handle_sla_violation(&source, violation);
        }

        if let Some(breach) = breach {
            self.handle_threshold_breach(metric, &source, value, breach);
        }
    }

    fn handle_anomaly(&self, anomaly: Anomaly) {
        self.anomalies.record(anomaly.clone());
        self.metrics.inc_anomalies_detected();
        self.logger.log_anomaly(&anomaly);
        self.track_fanout(self.anomaly_subscribers.notify(&anomaly));

        if anomaly.warrants_alert() {
            let mut metadata = Metadata::new();
            metadata.insert("z_score".to_string(), anomaly.metadata.z_score.into());
            metadata.insert("std_dev".to_string(), anomaly.metadata.std_dev.into());
            metadata.insert("anomaly_kind".to_string(), anomaly.kind.to_string().into());

            self.raise(AlertDraft {
                severity: anomaly.severity,
                title: format!("Anomaly detected in {}", anomaly.metric),
                description: anomaly.description.clone(),
                metric: anomaly.metric,
                source: anomaly.source.clone(),
                current_value: anomaly.anomalous_value,
                threshold_value: anomaly.baseline_value,
                origin: AlertOrigin::Anomaly {
                    anomaly_id: anomaly.id.clone(),
                    confidence: anomaly.confidence,
                },
                metadata,
            });
        }
    }

    fn handle_sla_violation(&self, source: &str, violation: SlaViolation) {
        self.metrics.inc_sla_violations();
        self.logger.log_sla_violation(
            &violation.sla_id,
            source,
            violation.violation_percent,
            violation.threshold.allowed_violation_percent,
        );

        let mut metadata = Metadata::new();
        metadata.insert("sla_threshold".to_string(), violation.threshold.value.into());
        metadata.insert(
            "time_window_minutes".to_string(),
            violation.threshold.time_window_minutes.into(),
        );
        metadata.insert("sample_count".to_string(), violation.sample_count.into());

        self.raise(AlertDraft {
            severity: AlertSeverity::Critical,
            title: format!("SLA violation: {}", violation.sla_name),
            description: format!(
                "{} violated {:.1}% of the time over the last {} minutes (allowed {:.1}%)",
                violation.threshold.metric,
                violation.violation_percent,
                violation.threshold.time_window_minutes,
                violation.threshold.allowed_violation_percent
            ),
            metric: violation.threshold.metric,
            source: source.to_string(),
            current_value: violation.violation_percent,
            threshold_value: violation.threshold.allowed_violation_percent,
            origin: AlertOrigin::Sla {
                sla_id: violation.sla_id,
            },
            metadata,
        });
    }

    fn handle_threshold_breach(
        &self,
        metric: MetricKind,
        source: &str,
        value: f64,
        breach: ThresholdBreach,
    ) {
        self.raise(AlertDraft {
            severity: breach.severity,
            title: format!("High {}", metric),
            description: format!(
                "{} on {} is {:.2}, at or above the {} threshold of {:.2}",
                metric, source, value, breach.severity, breach.threshold
            ),
            metric,
            source: source.to_string(),
            current_value: value,
            threshold_value: breach.threshold,
            origin: AlertOrigin::Threshold,
            metadata: Metadata::new(),
        });
    }

    /// Single de-duplication point for every detection path
    fn raise(&self, draft: AlertDraft) -> CreateOutcome {
        let outcome = self.alerts.create(draft);
        if let CreateOutcome::Created(alert) = &outcome {
            self.metrics.inc_alerts_created();
            self.logger.log_alert_created(alert);
            self.track_fanout(self.alert_subscribers.notify(alert));
        }
        outcome
    }

    fn track_fanout(&self, report: FanoutReport) {
        if report.failed > 0 {
            self.metrics.add_subscriber_failures(report.failed);
        }
    }

    /// Sample host CPU/memory and ingest them under `source`
    pub async fn record_system_metrics(
        &self,
        system: &dyn SystemMetricsSource,
        source: &str,
    ) -> Result<()> {
        let sample = system.sample().await.map_err(|e| {
            warn!(source = %source, error = %e, "System metrics sampling failed");
            MonitorError::SystemSource(e.to_string())
        })?;

        self.ingest_metric(MetricKind::CpuUsage, sample.cpu_percent, source, None);
        self.ingest_metric(MetricKind::MemoryUsage, sample.memory_percent, source, None);
        Ok(())
    }

    /// Register an alert observer; called for every newly created alert
    pub fn subscribe_to_alerts<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Alert) -> Result<()> + Send + Sync + 'static,
    {
        self.alert_subscribers.subscribe(callback)
    }

    /// Register an anomaly observer; called for every detected anomaly
    pub fn subscribe_to_anomalies<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Anomaly) -> Result<()> + Send + Sync + 'static,
    {
        self.anomaly_subscribers.subscribe(callback)
    }

    pub fn unsubscribe_alerts(&self, id: SubscriptionId) -> bool {
        self.alert_subscribers.unsubscribe(id)
    }

    pub fn unsubscribe_anomalies(&self, id: SubscriptionId) -> bool {
        self.anomaly_subscribers.unsubscribe(id)
    }

    pub fn acknowledge_alert(&self, id: &str, actor: &str) -> Result<Alert> {
        let alert = self.alerts.acknowledge(id, actor)?;
        self.logger.log_alert_acknowledged(&alert);
        Ok(alert)
    }

    pub fn resolve_alert(&self, id: &str, actor: &str) -> Result<Alert> {
        let alert = self.alerts.resolve(id, actor)?;
        self.metrics.inc_alerts_resolved();
        self.logger.log_alert_resolved(&alert, false);
        Ok(alert)
    }

    pub fn list_active_alerts(&self) -> Vec<Alert> {
        self.alerts.list_active()
    }

    pub fn get_alert(&self, id: &str) -> Option<Alert> {
        self.alerts.get(id)
    }

    pub fn all_alerts(&self) -> Vec<Alert> {
        self.alerts.all()
    }

    /// Anomalies detected in the last `hours`, newest first
    pub fn recent_anomalies(&self, hours: u64) -> Vec<Anomaly> {
        self.anomalies
            .recent(Duration::from_secs(hours.saturating_mul(3600)), Utc::now())
    }

    /// Last `n` buffered points for a metric/source pair
    pub fn buffer_snapshot(
        &self,
        metric: MetricKind,
        source: &str,
        n: usize,
    ) -> Vec<MetricDataPoint> {
        self.buffers.recent(metric, source, n)
    }

    /// Compliance of every configured SLA across all reporting sources
    pub fn sla_status(&self) -> Vec<SlaStatus> {
        let now = Utc::now();
        self.config
            .slas
            .iter()
            .map(|sla| self.status_of(sla, now))
            .collect()
    }

    fn status_of(&self, sla: &PerformanceSla, now: chrono::DateTime<Utc>) -> SlaStatus {
        let thresholds: Vec<_> = sla
            .thresholds
            .iter()
            .map(|threshold| {
                let mut per_source = Vec::new();
                self.buffers.for_metric(threshold.metric, |_, buffer| {
                    per_source.push(self.sla_evaluator.evaluate_threshold(threshold, buffer, now));
                });
                merge_evaluations(threshold, per_source)
            })
            .collect();

        SlaStatus {
            sla_id: sla.id.clone(),
            name: sla.name.clone(),
            active: sla.active,
            state: overall_state(&thresholds),
            thresholds,
        }
    }

    pub fn monitoring_stats(&self) -> MonitoringStats {
        let alerts = self.alerts.counts();
        self.metrics.set_active_alerts(alerts.active);

        MonitoringStats {
            tracked_buffers: self.buffers.len(),
            buffered_points: self.buffers.total_points(),
            points_ingested: self.points_ingested.load(Ordering::Relaxed),
            alerts,
            anomalies: self.anomalies.len(),
            alert_subscribers: self.alert_subscribers.len(),
            anomaly_subscribers: self.anomaly_subscribers.len(),
            active_slas: self.config.slas.iter().filter(|s| s.active).count(),
            maintenance_running: self.maintenance_running.load(Ordering::SeqCst),
        }
    }

    /// Run one maintenance tick immediately, outside the background loop
    pub async fn run_maintenance_once(&self) -> MaintenanceReport {
        let maintenance = MaintenanceLoop::new(
            self.buffers.clone(),
            self.alerts.clone(),
            self.anomalies.clone(),
            MaintenanceConfig::from(&self.config),
            self.logger.clone(),
            self.health.clone(),
        );
        let report = maintenance.tick().await;
        info!(
            pruned = report.anomalies_pruned,
            resolved = report.alerts_auto_resolved.len(),
            "Manual maintenance tick complete"
        );
        report
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Direct access to the alert store
    pub fn alerts(&self) -> &AlertStore {
        &self.alerts
    }

    /// Direct access to the anomaly log
    pub fn anomalies(&self) -> &AnomalyLog {
        &self.anomalies
    }
}
