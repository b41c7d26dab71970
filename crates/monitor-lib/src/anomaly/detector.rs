//! Z-score anomaly detection
//!
//! Compares the newest point in a buffer against rolling statistics of the
//! points that preceded it and classifies the deviation.

use chrono::Utc;

use crate::buffer::MetricBuffer;
use crate::models::{
    traceable_id, AlertSeverity, Anomaly, AnomalyKind, AnomalyStats, MetricDataPoint,
};

/// Minimum baseline samples required for detection
const MIN_SAMPLES_FOR_DETECTION: usize = 10;

/// Maximum baseline samples used for rolling statistics
const DEFAULT_BASELINE_SIZE: usize = 50;

/// Z-score above which a deviation is critical
const CRITICAL_Z: f64 = 4.0;

/// Z-score above which a deviation is high (spike or drop)
const HIGH_Z: f64 = 3.0;

/// Z-score above which a deviation is a medium outlier
const OUTLIER_Z: f64 = 2.0;

/// Flags statistically unusual points against a rolling baseline
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    /// Baseline points required before detection runs
    pub min_samples: usize,
    /// Maximum baseline points considered
    pub baseline_size: usize,
}

impl AnomalyDetector {
    pub fn new(min_samples: usize, baseline_size: usize) -> Self {
        Self {
            min_samples,
            baseline_size,
        }
    }

    /// Inspect the newest point of `buffer`.
    ///
    /// # Returns
    /// * `Some(Anomaly)` if the point deviates more than 2 standard deviations
    /// * `None` on insufficient data, zero variance, or a normal value
    pub fn detect(&self, buffer: &MetricBuffer, current: &MetricDataPoint) -> Option<Anomaly> {
        let baseline = buffer.baseline_values(self.baseline_size);
        if baseline.len() < self.min_samples {
            return None;
        }

        let stats = RollingStats::from_values(&baseline);
        self.classify(current, &stats)
    }

    /// Classify a value against precomputed statistics
    pub fn classify(&self, current: &MetricDataPoint, stats: &RollingStats) -> Option<Anomaly> {
        // Avoid division by zero
        if stats.std_dev < f64::EPSILON {
            return None;
        }

        let value = current.value;
        let z_score = (value - stats.mean).abs() / stats.std_dev;

        let (kind, severity, confidence) = if z_score > HIGH_Z {
            let severity = if z_score > CRITICAL_Z {
                AlertSeverity::Critical
            } else {
                AlertSeverity::High
            };
            let kind = if value > stats.mean + HIGH_Z * stats.std_dev {
                AnomalyKind::Spike
            } else {
                AnomalyKind::Drop
            };
            (kind, severity, (z_score / 5.0).min(1.0))
        } else if z_score > OUTLIER_Z {
            (
                AnomalyKind::Outlier,
                AlertSeverity::Medium,
                (z_score / 3.0).min(1.0),
            )
        } else {
            return None;
        };

        let detected_at = Utc::now();
        Some(Anomaly {
            id: traceable_id(current.metric, &current.source, "anomaly", detected_at),
            kind,
            metric: current.metric,
            source: current.source.clone(),
            confidence,
            severity,
            description: format!(
                "{} {} detected: value {:.2} vs baseline {:.2} (z-score {:.2})",
                current.metric, kind, value, stats.mean, z_score
            ),
            detected_at,
            start_time: current.timestamp,
            end_time: None,
            baseline_value: stats.mean,
            anomalous_value: value,
            metadata: AnomalyStats {
                z_score,
                mean: stats.mean,
                std_dev: stats.std_dev,
            },
        })
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(MIN_SAMPLES_FOR_DETECTION, DEFAULT_BASELINE_SIZE)
    }
}

/// Mean and sample standard deviation of a baseline window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl RollingStats {
    /// Compute statistics using the two-pass algorithm for stability
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                count,
            };
        }

        let mean = values.iter().sum::<f64>() / count as f64;

        let std_dev = if count > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (count - 1) as f64; // Bessel's correction
            variance.sqrt()
        } else {
            0.0
        };

        Self {
            mean,
            std_dev,
            count,
        }
    }
}
