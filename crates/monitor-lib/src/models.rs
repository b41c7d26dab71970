//! Core data models for the monitoring engine

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to points and alerts
pub type Metadata = HashMap<String, serde_json::Value>;

/// Kind of measurement carried by a data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    ResponseTime,
    ErrorRate,
    Throughput,
    CpuUsage,
    MemoryUsage,
    QueueSize,
    Accuracy,
    Availability,
}

impl MetricKind {
    pub const ALL: [MetricKind; 8] = [
        MetricKind::ResponseTime,
        MetricKind::ErrorRate,
        MetricKind::Throughput,
        MetricKind::CpuUsage,
        MetricKind::MemoryUsage,
        MetricKind::QueueSize,
        MetricKind::Accuracy,
        MetricKind::Availability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::ResponseTime => "response_time",
            MetricKind::ErrorRate => "error_rate",
            MetricKind::Throughput => "throughput",
            MetricKind::CpuUsage => "cpu_usage",
            MetricKind::MemoryUsage => "memory_usage",
            MetricKind::QueueSize => "queue_size",
            MetricKind::Accuracy => "accuracy",
            MetricKind::Availability => "availability",
        }
    }

    /// Metrics where a falling value means the condition is recovering.
    ///
    /// Only these are eligible for auto-resolution.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, MetricKind::ResponseTime | MetricKind::ErrorRate)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single time-stamped measurement. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub timestamp: DateTime<Utc>,
    pub metric: MetricKind,
    pub value: f64,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl MetricDataPoint {
    /// Create a point stamped with the current time
    pub fn new(metric: MetricKind, value: f64, source: impl Into<String>) -> Self {
        Self::at(Utc::now(), metric, value, source)
    }

    /// Create a point with an explicit timestamp
    pub fn at(
        timestamp: DateTime<Utc>,
        metric: MetricKind,
        value: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            metric,
            value,
            source: source.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Alert and anomaly severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::High => "high",
            AlertSeverity::Medium => "medium",
            AlertSeverity::Low => "low",
            AlertSeverity::Info => "info",
        };
        f.write_str(s)
    }
}

/// Alert lifecycle status
///
/// `Muted` is part of the model but no operation moves an alert into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Muted,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Muted)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Muted => "muted",
        };
        f.write_str(s)
    }
}

/// Which detection path raised an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum AlertOrigin {
    Threshold,
    Sla { sla_id: String },
    Anomaly { anomaly_id: String, confidence: f64 },
}

impl AlertOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            AlertOrigin::Threshold => "threshold",
            AlertOrigin::Sla { .. } => "sla",
            AlertOrigin::Anomaly { .. } => "anomaly",
        }
    }
}

/// A stateful alert tracked through the acknowledge/resolve lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub title: String,
    pub description: String,
    pub metric: MetricKind,
    pub current_value: f64,
    pub threshold_value: f64,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_by: Option<String>,
    #[serde(flatten)]
    pub origin: AlertOrigin,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

/// Anomaly classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Spike,
    Drop,
    Outlier,
    TrendChange,
    PatternChange,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnomalyKind::Spike => "spike",
            AnomalyKind::Drop => "drop",
            AnomalyKind::Outlier => "outlier",
            AnomalyKind::TrendChange => "trend_change",
            AnomalyKind::PatternChange => "pattern_change",
        };
        f.write_str(s)
    }
}

/// Rolling statistics captured when an anomaly fires
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyStats {
    pub z_score: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// A data point flagged as unusual against its rolling baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    pub kind: AnomalyKind,
    pub metric: MetricKind,
    pub source: String,
    pub confidence: f64,
    pub severity: AlertSeverity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub baseline_value: f64,
    pub anomalous_value: f64,
    pub metadata: AnomalyStats,
}

impl Anomaly {
    /// Whether this anomaly is severe enough to raise an alert
    pub fn warrants_alert(&self) -> bool {
        matches!(self.severity, AlertSeverity::Critical | AlertSeverity::High)
    }
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Build a human-traceable identifier from metric, source, kind and time.
///
/// A process-wide sequence suffix keeps ids unique within the same millisecond.
pub(crate) fn traceable_id(
    metric: MetricKind,
    source: &str,
    kind: &str,
    at: DateTime<Utc>,
) -> String {
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}_{}_{}_{}_{}",
        metric,
        source,
        kind,
        at.timestamp_millis(),
        seq
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traceable_ids_are_unique() {
        let now = Utc::now();
        let a = traceable_id(MetricKind::ResponseTime, "svc", "threshold", now);
        let b = traceable_id(MetricKind::ResponseTime, "svc", "threshold", now);
        assert_ne!(a, b);
        assert!(a.starts_with("response_time_svc_threshold_"));
    }

    #[test]
    fn test_metric_kind_serde_names() {
        let json = serde_json::to_string(&MetricKind::ResponseTime).unwrap();
        assert_eq!(json, "\"response_time\"");
        let kind: MetricKind = serde_json::from_str("\"queue_size\"").unwrap();
        assert_eq!(kind, MetricKind::QueueSize);
        assert_eq!(MetricKind::CpuUsage.to_string(), "cpu_usage");

        for kind in MetricKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_lower_is_better() {
        assert!(MetricKind::ResponseTime.lower_is_better());
        assert!(MetricKind::ErrorRate.lower_is_better());
        assert!(!MetricKind::Availability.lower_is_better());
        assert!(!MetricKind::CpuUsage.lower_is_better());
    }

    #[test]
    fn test_alert_origin_flattened() {
        let now = Utc::now();
        let alert = Alert {
            id: "a-1".to_string(),
            severity: AlertSeverity::Critical,
            status: AlertStatus::Active,
            title: "t".to_string(),
            description: "d".to_string(),
            metric: MetricKind::ErrorRate,
            current_value: 10.0,
            threshold_value: 0.0,
            source: "svc".to_string(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
            acknowledged_by: None,
            resolved_by: None,
            origin: AlertOrigin::Sla {
                sla_id: "error_rate".to_string(),
            },
            metadata: Metadata::new(),
        };

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["origin"], "sla");
        assert_eq!(value["sla_id"], "error_rate");
        assert_eq!(value["status"], "active");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(AlertStatus::Resolved.is_terminal());
        assert!(AlertStatus::Muted.is_terminal());
        assert!(!AlertStatus::Active.is_terminal());
        assert!(!AlertStatus::Acknowledged.is_terminal());
    }
}
