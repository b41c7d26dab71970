//! Engine configuration

use std::collections::HashMap;
use std::time::Duration;

use crate::alerting::StaticThreshold;
use crate::models::MetricKind;
use crate::sla::{default_slas, PerformanceSla};

/// Default points kept per (metric, source) buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Default maintenance tick interval (10 seconds)
const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);

/// Default anomaly retention (2 hours)
const DEFAULT_ANOMALY_RETENTION: Duration = Duration::from_secs(2 * 60 * 60);

/// Default minimum alert age before auto-resolution is considered (1 hour)
const DEFAULT_AUTO_RESOLVE_AGE: Duration = Duration::from_secs(60 * 60);

/// Configuration for the monitoring engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum points held per (metric, source) buffer
    pub buffer_capacity: usize,
    /// Baseline points required before anomaly detection runs
    pub anomaly_min_samples: usize,
    /// Maximum baseline points used for rolling statistics
    pub anomaly_baseline_size: usize,
    /// In-window points required before an SLA threshold is judged
    pub sla_min_samples: usize,
    /// Maintenance loop tick interval
    pub maintenance_interval: Duration,
    /// How long anomalies are kept before pruning
    pub anomaly_retention: Duration,
    /// Minimum age of an active alert before auto-resolution is considered
    pub auto_resolve_after: Duration,
    /// Number of recent points averaged for auto-resolution
    pub auto_resolve_samples: usize,
    /// Fraction of the alert threshold the recent mean must fall below
    pub auto_resolve_ratio: f64,
    /// Retention for resolved/muted alerts; `None` keeps them forever
    pub alert_retention: Option<Duration>,
    /// Static warning/critical pairs per metric
    pub thresholds: HashMap<MetricKind, StaticThreshold>,
    /// Configured SLAs, read-only once the engine is built
    pub slas: Vec<PerformanceSla>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            anomaly_min_samples: 10,
            anomaly_baseline_size: 50,
            sla_min_samples: 5,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            anomaly_retention: DEFAULT_ANOMALY_RETENTION,
            auto_resolve_after: DEFAULT_AUTO_RESOLVE_AGE,
            auto_resolve_samples: 10,
            auto_resolve_ratio: 0.8,
            alert_retention: None,
            thresholds: StaticThreshold::defaults(),
            slas: default_slas(),
        }
    }
}

impl EngineConfig {
    /// Set the per-buffer capacity
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set the maintenance tick interval
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Enable eviction of resolved/muted alerts older than `retention`
    pub fn with_alert_retention(mut self, retention: Duration) -> Self {
        self.alert_retention = Some(retention);
        self
    }

    /// Replace the SLA set
    pub fn with_slas(mut self, slas: Vec<PerformanceSla>) -> Self {
        self.slas = slas;
        self
    }

    /// Override the static threshold for one metric
    pub fn with_threshold(mut self, metric: MetricKind, threshold: StaticThreshold) -> Self {
        self.thresholds.insert(metric, threshold);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer_capacity, 1000);
        assert_eq!(config.maintenance_interval, Duration::from_secs(10));
        assert_eq!(config.anomaly_retention, Duration::from_secs(7200));
        assert_eq!(config.auto_resolve_after, Duration::from_secs(3600));
        assert!(config.alert_retention.is_none());
        assert_eq!(config.slas.len(), 3);
    }

    #[test]
    fn test_engine_config_builders() {
        let config = EngineConfig::default()
            .with_buffer_capacity(20)
            .with_alert_retention(Duration::from_secs(60))
            .with_threshold(
                MetricKind::Throughput,
                StaticThreshold {
                    warning: 10.0,
                    critical: 20.0,
                },
            );

        assert_eq!(config.buffer_capacity, 20);
        assert_eq!(config.alert_retention, Some(Duration::from_secs(60)));
        assert!(config.thresholds.contains_key(&MetricKind::Throughput));
    }
}
