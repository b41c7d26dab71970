//! Observability infrastructure for the monitoring engine
//!
//! Provides:
//! - Prometheus metrics (ingest volume, alerts, anomalies, maintenance latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{Alert, AlertSeverity, Anomaly};

/// Histogram buckets for maintenance tick latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    points_ingested: IntCounter,
    anomalies_detected: IntCounter,
    alerts_created: IntCounter,
    alerts_resolved: IntCounter,
    sla_violations: IntCounter,
    subscriber_failures: IntCounter,
    maintenance_latency_seconds: Histogram,
    maintenance_failures: IntCounter,
    active_alerts: IntGauge,
    tracked_buffers: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            points_ingested: register_int_counter!(
                "metrics_monitor_points_ingested_total",
                "Total number of metric data points ingested"
            )
            .expect("Failed to register points_ingested"),

            anomalies_detected: register_int_counter!(
                "metrics_monitor_anomalies_detected_total",
                "Total number of anomalies detected"
            )
            .expect("Failed to register anomalies_detected"),

            alerts_created: register_int_counter!(
                "metrics_monitor_alerts_created_total",
                "Total number of alerts created"
            )
            .expect("Failed to register alerts_created"),

            alerts_resolved: register_int_counter!(
                "metrics_monitor_alerts_resolved_total",
                "Total number of alerts resolved, manually or automatically"
            )
            .expect("Failed to register alerts_resolved"),

            sla_violations: register_int_counter!(
                "metrics_monitor_sla_violations_total",
                "Total number of SLA threshold violations observed"
            )
            .expect("Failed to register sla_violations"),

            subscriber_failures: register_int_counter!(
                "metrics_monitor_subscriber_failures_total",
                "Total number of failed subscriber notifications"
            )
            .expect("Failed to register subscriber_failures"),

            maintenance_latency_seconds: register_histogram!(
                "metrics_monitor_maintenance_latency_seconds",
                "Time spent in one maintenance tick",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register maintenance_latency_seconds"),

            maintenance_failures: register_int_counter!(
                "metrics_monitor_maintenance_failures_total",
                "Total number of failed maintenance steps"
            )
            .expect("Failed to register maintenance_failures"),

            active_alerts: register_int_gauge!(
                "metrics_monitor_active_alerts",
                "Number of alerts currently active"
            )
            .expect("Failed to register active_alerts"),

            tracked_buffers: register_int_gauge!(
                "metrics_monitor_tracked_buffers",
                "Number of (metric, source) buffers held in memory"
            )
            .expect("Failed to register tracked_buffers"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn inc_points_ingested(&self) {
        self.inner().points_ingested.inc();
    }

    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn inc_alerts_created(&self) {
        self.inner().alerts_created.inc();
    }

    pub fn inc_alerts_resolved(&self) {
        self.inner().alerts_resolved.inc();
    }

    pub fn inc_sla_violations(&self) {
        self.inner().sla_violations.inc();
    }

    pub fn add_subscriber_failures(&self, count: usize) {
        self.inner().subscriber_failures.inc_by(count as u64);
    }

    pub fn observe_maintenance_latency(&self, duration_secs: f64) {
        self.inner().maintenance_latency_seconds.observe(duration_secs);
    }

    pub fn inc_maintenance_failures(&self) {
        self.inner().maintenance_failures.inc();
    }

    pub fn set_active_alerts(&self, count: usize) {
        self.inner().active_alerts.set(count as i64);
    }

    pub fn set_tracked_buffers(&self, count: usize) {
        self.inner().tracked_buffers.set(count as i64);
    }
}

/// Structured logger for engine events
///
/// Provides consistent JSON-formatted logging for alerts, anomalies,
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_alert_created(&self, alert: &Alert) {
        warn!(
            event = "alert_created",
            instance = %self.instance,
            alert_id = %alert.id,
            origin = alert.origin.label(),
            severity = %alert.severity,
            metric = %alert.metric,
            source = %alert.source,
            current_value = alert.current_value,
            threshold_value = alert.threshold_value,
            "{}",
            alert.title
        );
    }

    pub fn log_alert_acknowledged(&self, alert: &Alert) {
        info!(
            event = "alert_acknowledged",
            instance = %self.instance,
            alert_id = %alert.id,
            actor = alert.acknowledged_by.as_deref().unwrap_or_default(),
            "Alert acknowledged"
        );
    }

    pub fn log_alert_resolved(&self, alert: &Alert, auto: bool) {
        info!(
            event = "alert_resolved",
            instance = %self.instance,
            alert_id = %alert.id,
            actor = alert.resolved_by.as_deref().unwrap_or_default(),
            auto = auto,
            "Alert resolved"
        );
    }

    pub fn log_anomaly(&self, anomaly: &Anomaly) {
        match anomaly.severity {
            AlertSeverity::Critical => {
                warn!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    anomaly_id = %anomaly.id,
                    anomaly_type = %anomaly.kind,
                    severity = %anomaly.severity,
                    metric = %anomaly.metric,
                    source = %anomaly.source,
                    z_score = anomaly.metadata.z_score,
                    confidence = anomaly.confidence,
                    "Critical anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    anomaly_id = %anomaly.id,
                    anomaly_type = %anomaly.kind,
                    severity = %anomaly.severity,
                    metric = %anomaly.metric,
                    source = %anomaly.source,
                    z_score = anomaly.metadata.z_score,
                    confidence = anomaly.confidence,
                    "Anomaly detected"
                );
            }
        }
    }

    pub fn log_sla_violation(
        &self,
        sla_id: &str,
        source: &str,
        violation_percent: f64,
        allowed: f64,
    ) {
        warn!(
            event = "sla_violation",
            instance = %self.instance,
            sla_id = %sla_id,
            source = %source,
            violation_percent = violation_percent,
            allowed_violation_percent = allowed,
            "SLA violation detected"
        );
    }

    pub fn log_maintenance(
        &self,
        pruned: usize,
        auto_resolved: usize,
        evicted: usize,
        errors: usize,
    ) {
        if errors > 0 {
            warn!(
                event = "maintenance_tick",
                instance = %self.instance,
                anomalies_pruned = pruned,
                alerts_auto_resolved = auto_resolved,
                alerts_evicted = evicted,
                errors = errors,
                "Maintenance tick completed with errors"
            );
        } else if pruned + auto_resolved + evicted > 0 {
            info!(
                event = "maintenance_tick",
                instance = %self.instance,
                anomalies_pruned = pruned,
                alerts_auto_resolved = auto_resolved,
                alerts_evicted = evicted,
                "Maintenance tick completed"
            );
        }
    }

    pub fn log_subscriber_failure(&self, topic: &str, subscription: u64, reason: &str) {
        warn!(
            event = "subscriber_failed",
            instance = %self.instance,
            topic = %topic,
            subscription = subscription,
            reason = %reason,
            "Subscriber notification failed"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            version = %version,
            "Metrics monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Metrics monitor shutting down"
        );
    }
}
