//! Service-level agreements evaluated over trailing time windows
//!
//! SLAs are configured at startup and are read-only afterwards.

mod evaluator;

pub use evaluator::{SlaEvaluator, SlaState, SlaStatus, SlaViolation, ThresholdEvaluation};
pub(crate) use evaluator::{merge_evaluations, overall_state};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::MetricKind;

/// How a measured value is compared against the SLA target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Compliant while the value stays strictly below the target
    LessThan,
    /// Compliant while the value stays strictly above the target
    GreaterThan,
    /// Compliant only at exactly the target
    Equal,
}

impl Comparator {
    /// Whether `value` breaks the target under this comparator
    pub fn is_violation(&self, value: f64, target: f64) -> bool {
        match self {
            Comparator::LessThan => value >= target,
            Comparator::GreaterThan => value <= target,
            Comparator::Equal => value != target,
        }
    }
}

/// One compliance bound of an SLA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaThreshold {
    pub metric: MetricKind,
    pub value: f64,
    pub comparator: Comparator,
    pub time_window_minutes: u32,
    pub allowed_violation_percent: f64,
}

impl SlaThreshold {
    pub fn time_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.time_window_minutes) * 60)
    }
}

/// A named set of thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSla {
    pub id: String,
    pub name: String,
    pub description: String,
    pub thresholds: Vec<SlaThreshold>,
    pub active: bool,
}

impl PerformanceSla {
    /// Thresholds of this SLA that apply to `metric`
    pub fn thresholds_for(&self, metric: MetricKind) -> impl Iterator<Item = &SlaThreshold> {
        self.thresholds.iter().filter(move |t| t.metric == metric)
    }
}

/// The three SLAs configured out of the box
pub fn default_slas() -> Vec<PerformanceSla> {
    vec![
        PerformanceSla {
            id: "api_response_time".to_string(),
            name: "API Response Time".to_string(),
            description: "Responses under 2 seconds 95% of the time".to_string(),
            thresholds: vec![SlaThreshold {
                metric: MetricKind::ResponseTime,
                value: 2000.0,
                comparator: Comparator::LessThan,
                time_window_minutes: 5,
                allowed_violation_percent: 5.0,
            }],
            active: true,
        },
        PerformanceSla {
            id: "error_rate".to_string(),
            name: "Error Rate".to_string(),
            description: "Error rate below 1%".to_string(),
            thresholds: vec![SlaThreshold {
                metric: MetricKind::ErrorRate,
                value: 1.0,
                comparator: Comparator::LessThan,
                time_window_minutes: 10,
                allowed_violation_percent: 0.0,
            }],
            active: true,
        },
        PerformanceSla {
            id: "availability".to_string(),
            name: "Service Availability".to_string(),
            description: "Availability above 99.9%".to_string(),
            thresholds: vec![SlaThreshold {
                metric: MetricKind::Availability,
                value: 99.9,
                comparator: Comparator::GreaterThan,
                time_window_minutes: 60,
                allowed_violation_percent: 0.1,
            }],
            active: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparators() {
        assert!(Comparator::LessThan.is_violation(2000.0, 2000.0));
        assert!(!Comparator::LessThan.is_violation(1999.0, 2000.0));
        assert!(Comparator::GreaterThan.is_violation(99.9, 99.9));
        assert!(!Comparator::GreaterThan.is_violation(99.95, 99.9));
        assert!(Comparator::Equal.is_violation(1.0, 2.0));
        assert!(!Comparator::Equal.is_violation(2.0, 2.0));
    }

    #[test]
    fn test_default_slas() {
        let slas = default_slas();
        assert_eq!(slas.len(), 3);
        assert!(slas.iter().all(|s| s.active));

        let response = &slas[0];
        assert_eq!(response.thresholds[0].time_window(), Duration::from_secs(300));
        assert_eq!(response.thresholds_for(MetricKind::ResponseTime).count(), 1);
        assert_eq!(response.thresholds_for(MetricKind::ErrorRate).count(), 0);
    }
}
