//! Windowed SLA compliance evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PerformanceSla, SlaThreshold};
use crate::buffer::MetricBuffer;
use crate::models::MetricKind;

/// Minimum in-window points before a threshold is judged
const MIN_SAMPLES_FOR_EVALUATION: usize = 5;

/// Compliance state of a threshold or SLA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaState {
    Compliant,
    Violated,
    InsufficientData,
}

/// Result of evaluating one threshold against one buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEvaluation {
    pub metric: MetricKind,
    pub sample_count: usize,
    pub violation_count: usize,
    /// `None` when there was not enough data to judge
    pub violation_percent: Option<f64>,
    pub allowed_violation_percent: f64,
    pub state: SlaState,
}

/// A threshold breached by the buffer that was just updated
#[derive(Debug, Clone, PartialEq)]
pub struct SlaViolation {
    pub sla_id: String,
    pub sla_name: String,
    pub threshold: SlaThreshold,
    pub violation_percent: f64,
    pub sample_count: usize,
}

/// Per-SLA status for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaStatus {
    pub sla_id: String,
    pub name: String,
    pub active: bool,
    pub state: SlaState,
    pub thresholds: Vec<ThresholdEvaluation>,
}

/// Checks SLA thresholds over trailing windows of a buffer
#[derive(Debug, Clone)]
pub struct SlaEvaluator {
    pub min_samples: usize,
}

impl SlaEvaluator {
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples }
    }

    /// Evaluate a single threshold against a buffer
    pub fn evaluate_threshold(
        &self,
        threshold: &SlaThreshold,
        buffer: &MetricBuffer,
        now: DateTime<Utc>,
    ) -> ThresholdEvaluation {
        let points = buffer.within(threshold.time_window(), now);
        let sample_count = points.len();

        if sample_count < self.min_samples {
            return ThresholdEvaluation {
                metric: threshold.metric,
                sample_count,
                violation_count: 0,
                violation_percent: None,
                allowed_violation_percent: threshold.allowed_violation_percent,
                state: SlaState::InsufficientData,
            };
        }

        let violation_count = points
            .iter()
            .filter(|p| threshold.comparator.is_violation(p.value, threshold.value))
            .count();
        let violation_percent = violation_count as f64 / sample_count as f64 * 100.0;

        let state = if violation_percent > threshold.allowed_violation_percent {
            SlaState::Violated
        } else {
            SlaState::Compliant
        };

        ThresholdEvaluation {
            metric: threshold.metric,
            sample_count,
            violation_count,
            violation_percent: Some(violation_percent),
            allowed_violation_percent: threshold.allowed_violation_percent,
            state,
        }
    }

    /// Evaluate every active SLA threshold that references `metric`.
    ///
    /// Thresholds of the same SLA are judged independently.
    pub fn evaluate(
        &self,
        slas: &[PerformanceSla],
        metric: MetricKind,
        buffer: &MetricBuffer,
        now: DateTime<Utc>,
    ) -> Vec<SlaViolation> {
        let mut violations = Vec::new();

        for sla in slas.iter().filter(|s| s.active) {
            for threshold in sla.thresholds_for(metric) {
                let evaluation = self.evaluate_threshold(threshold, buffer, now);
                if let (SlaState::Violated, Some(percent)) =
                    (evaluation.state, evaluation.violation_percent)
                {
                    violations.push(SlaViolation {
                        sla_id: sla.id.clone(),
                        sla_name: sla.name.clone(),
                        threshold: threshold.clone(),
                        violation_percent: percent,
                        sample_count: evaluation.sample_count,
                    });
                }
            }
        }

        violations
    }
}

impl Default for SlaEvaluator {
    fn default() -> Self {
        Self::new(MIN_SAMPLES_FOR_EVALUATION)
    }
}

/// Fold per-source evaluations of one threshold into a single report.
///
/// The worst source wins: any violation makes the threshold violated.
pub(crate) fn merge_evaluations(
    threshold: &SlaThreshold,
    evaluations: Vec<ThresholdEvaluation>,
) -> ThresholdEvaluation {
    let judged = evaluations
        .iter()
        .filter(|e| e.state != SlaState::InsufficientData)
        .max_by(|a, b| {
            let pa = a.violation_percent.unwrap_or(0.0);
            let pb = b.violation_percent.unwrap_or(0.0);
            pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
        });

    match judged {
        Some(worst) => worst.clone(),
        None => ThresholdEvaluation {
            metric: threshold.metric,
            sample_count: evaluations.iter().map(|e| e.sample_count).max().unwrap_or(0),
            violation_count: 0,
            violation_percent: None,
            allowed_violation_percent: threshold.allowed_violation_percent,
            state: SlaState::InsufficientData,
        },
    }
}

/// Overall state of an SLA from its threshold states
pub(crate) fn overall_state(thresholds: &[ThresholdEvaluation]) -> SlaState {
    if thresholds.iter().any(|t| t.state == SlaState::Violated) {
        SlaState::Violated
    } else if thresholds.iter().any(|t| t.state == SlaState::Compliant) {
        SlaState::Compliant
    } else {
        SlaState::InsufficientData
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricDataPoint;
    use crate::sla::{default_slas, Comparator};

    fn buffer(metric: MetricKind, values: &[f64], age_minutes: i64) -> MetricBuffer {
        let at = Utc::now() - chrono::Duration::minutes(age_minutes);
        let mut buffer = MetricBuffer::new(1000);
        for v in values {
            buffer.push(MetricDataPoint::at(at, metric, *v, "svc"));
        }
        buffer
    }

    #[test]
    fn test_violation_above_allowance() {
        let mut values = vec![1000.0; 9];
        values.push(2000.0);
        let buffer = buffer(MetricKind::ResponseTime, &values, 1);

        let violations = SlaEvaluator::default().evaluate(
            &default_slas(),
            MetricKind::ResponseTime,
            &buffer,
            Utc::now(),
        );

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].sla_id, "api_response_time");
        assert!((violations[0].violation_percent - 10.0).abs() < 1e-9);
        assert_eq!(violations[0].sample_count, 10);
    }

    #[test]
    fn test_no_violation_when_compliant() {
        let buffer = buffer(MetricKind::ResponseTime, &[1000.0; 10], 1);

        let violations = SlaEvaluator::default().evaluate(
            &default_slas(),
            MetricKind::ResponseTime,
            &buffer,
            Utc::now(),
        );

        assert!(violations.is_empty());
    }

    #[test]
    fn test_insufficient_data_skipped() {
        let buffer = buffer(MetricKind::ErrorRate, &[50.0; 4], 1);
        let evaluator = SlaEvaluator::default();
        let slas = default_slas();

        assert!(evaluator
            .evaluate(&slas, MetricKind::ErrorRate, &buffer, Utc::now())
            .is_empty());

        let eval = evaluator.evaluate_threshold(&slas[1].thresholds[0], &buffer, Utc::now());
        assert_eq!(eval.state, SlaState::InsufficientData);
        assert!(eval.violation_percent.is_none());
    }

    #[test]
    fn test_points_outside_window_ignored() {
        // Stale violations, 20 minutes old, fall outside the 5 minute window.
        let buffer = buffer(MetricKind::ResponseTime, &[5000.0; 10], 20);

        let eval = SlaEvaluator::default().evaluate_threshold(
            &default_slas()[0].thresholds[0],
            &buffer,
            Utc::now(),
        );

        assert_eq!(eval.sample_count, 0);
        assert_eq!(eval.state, SlaState::InsufficientData);
    }

    #[test]
    fn test_inactive_sla_ignored() {
        let mut slas = default_slas();
        slas.iter_mut().for_each(|s| s.active = false);
        let buffer = buffer(MetricKind::ResponseTime, &[5000.0; 10], 1);

        assert!(SlaEvaluator::default()
            .evaluate(&slas, MetricKind::ResponseTime, &buffer, Utc::now())
            .is_empty());
    }

    #[test]
    fn test_thresholds_of_one_sla_evaluated_independently() {
        let sla = PerformanceSla {
            id: "multi".to_string(),
            name: "Multi".to_string(),
            description: String::new(),
            thresholds: vec![
                SlaThreshold {
                    metric: MetricKind::QueueSize,
                    value: 100.0,
                    comparator: Comparator::LessThan,
                    time_window_minutes: 5,
                    allowed_violation_percent: 0.0,
                },
                SlaThreshold {
                    metric: MetricKind::QueueSize,
                    value: 10.0,
                    comparator: Comparator::Equal,
                    time_window_minutes: 5,
                    allowed_violation_percent: 50.0,
                },
            ],
            active: true,
        };
        let buffer = buffer(MetricKind::QueueSize, &[150.0; 5], 1);

        let violations =
            SlaEvaluator::default().evaluate(&[sla], MetricKind::QueueSize, &buffer, Utc::now());
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_merge_and_overall_state() {
        let threshold = default_slas()[0].thresholds[0].clone();
        let compliant = SlaEvaluator::default().evaluate_threshold(
            &threshold,
            &buffer(MetricKind::ResponseTime, &[1000.0; 10], 1),
            Utc::now(),
        );
        let violated = SlaEvaluator::default().evaluate_threshold(
            &threshold,
            &buffer(MetricKind::ResponseTime, &[3000.0; 10], 1),
            Utc::now(),
        );

        let merged = merge_evaluations(&threshold, vec![compliant.clone(), violated]);
        assert_eq!(merged.state, SlaState::Violated);
        assert_eq!(overall_state(&[compliant, merged]), SlaState::Violated);

        let empty = merge_evaluations(&threshold, Vec::new());
        assert_eq!(empty.state, SlaState::InsufficientData);
        assert_eq!(overall_state(&[empty]), SlaState::InsufficientData);
    }
}
