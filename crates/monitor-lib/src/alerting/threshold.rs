//! Static warning/critical thresholds per metric

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{AlertSeverity, MetricDataPoint, MetricKind};

/// A warning/critical pair for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticThreshold {
    pub warning: f64,
    pub critical: f64,
}

impl StaticThreshold {
    /// Built-in thresholds for metrics with a well-known ceiling
    pub fn defaults() -> HashMap<MetricKind, StaticThreshold> {
        HashMap::from([
            (
                MetricKind::ResponseTime,
                StaticThreshold {
                    warning: 3000.0,
                    critical: 5000.0,
                },
            ),
            (
                MetricKind::ErrorRate,
                StaticThreshold {
                    warning: 2.0,
                    critical: 5.0,
                },
            ),
            (
                MetricKind::CpuUsage,
                StaticThreshold {
                    warning: 75.0,
                    critical: 90.0,
                },
            ),
            (
                MetricKind::MemoryUsage,
                StaticThreshold {
                    warning: 75.0,
                    critical: 90.0,
                },
            ),
            (
                MetricKind::QueueSize,
                StaticThreshold {
                    warning: 500.0,
                    critical: 1000.0,
                },
            ),
        ])
    }
}

/// A point that crossed a static threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdBreach {
    pub severity: AlertSeverity,
    /// The bound that was crossed
    pub threshold: f64,
}

/// Checks single values against static thresholds
#[derive(Debug, Clone)]
pub struct ThresholdAlerter {
    thresholds: HashMap<MetricKind, StaticThreshold>,
}

impl ThresholdAlerter {
    pub fn new(thresholds: HashMap<MetricKind, StaticThreshold>) -> Self {
        Self { thresholds }
    }

    /// Critical at or above `critical`, high at or above `warning`
    pub fn check(&self, point: &MetricDataPoint) -> Option<ThresholdBreach> {
        let limits = self.thresholds.get(&point.metric)?;

        if point.value >= limits.critical {
            Some(ThresholdBreach {
                severity: AlertSeverity::Critical,
                threshold: limits.critical,
            })
        } else if point.value >= limits.warning {
            Some(ThresholdBreach {
                severity: AlertSeverity::High,
                threshold: limits.warning,
            })
        } else {
            None
        }
    }

    pub fn threshold_for(&self, metric: MetricKind) -> Option<&StaticThreshold> {
        self.thresholds.get(&metric)
    }
}

impl Default for ThresholdAlerter {
    fn default() -> Self {
        Self::new(StaticThreshold::defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(metric: MetricKind, value: f64) -> Option<ThresholdBreach> {
        ThresholdAlerter::default().check(&MetricDataPoint::new(metric, value, "svc"))
    }

    #[test]
    fn test_critical_breach() {
        let breach = check(MetricKind::ResponseTime, 6000.0).unwrap();
        assert_eq!(breach.severity, AlertSeverity::Critical);
        assert_eq!(breach.threshold, 5000.0);
    }

    #[test]
    fn test_warning_breach_is_high() {
        let breach = check(MetricKind::CpuUsage, 75.0).unwrap();
        assert_eq!(breach.severity, AlertSeverity::High);
        assert_eq!(breach.threshold, 75.0);
    }

    #[test]
    fn test_below_warning() {
        assert!(check(MetricKind::QueueSize, 499.0).is_none());
        assert!(check(MetricKind::ErrorRate, 1.5).is_none());
    }

    #[test]
    fn test_metric_without_threshold() {
        assert!(check(MetricKind::Throughput, 1_000_000.0).is_none());
        assert!(ThresholdAlerter::default()
            .threshold_for(MetricKind::Availability)
            .is_none());
    }
}
