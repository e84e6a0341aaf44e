//! Static threshold checks
//!
//! Runs on every ingested sample. Statistical detectors need history before
//! they can flag anything; hard limits apply from the first sample.

use serde::{Deserialize, Serialize};

use crate::models::{
    Alert, AlertDetail, AlertSource, AlertStatus, MetricSample, MonitoredMetric, Severity,
    ThresholdBreach, ThresholdLimits,
};

/// Which configured limit was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Min,
    Max,
    WarningMin,
    WarningMax,
}

impl Bound {
    fn describe(&self) -> &'static str {
        match self {
            Bound::Min => "below minimum",
            Bound::Max => "above maximum",
            Bound::WarningMin => "below warning minimum",
            Bound::WarningMax => "above warning maximum",
        }
    }
}

/// Result of checking one value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdOutcome {
    Ok,
    Violation {
        severity: Severity,
        bound: Bound,
        limit: f64,
    },
}

impl ThresholdOutcome {
    pub fn is_violation(&self) -> bool {
        matches!(self, ThresholdOutcome::Violation { .. })
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            ThresholdOutcome::Ok => None,
            ThresholdOutcome::Violation { severity, .. } => Some(*severity),
        }
    }
}

/// Severity for a crossed warning limit
pub const WARNING_SEVERITY: Severity = Severity::Medium;

/// Severity for a crossed hard limit
pub const LIMIT_SEVERITY: Severity = Severity::Critical;

/// Stateless evaluator for static limits
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    /// Check a value against the configured limits. Hard limits win over
    /// warning limits; unset limits are ignored.
    pub fn evaluate(value: f64, limits: &ThresholdLimits) -> ThresholdOutcome {
        if let Some(min) = limits.min.filter(|min| value < *min) {
            return violation(LIMIT_SEVERITY, Bound::Min, min);
        }
        if let Some(max) = limits.max.filter(|max| value > *max) {
            return violation(LIMIT_SEVERITY, Bound::Max, max);
        }
        if let Some(min) = limits.warning_min.filter(|min| value < *min) {
            return violation(WARNING_SEVERITY, Bound::WarningMin, min);
        }
        if let Some(max) = limits.warning_max.filter(|max| value > *max) {
            return violation(WARNING_SEVERITY, Bound::WarningMax, max);
        }
        ThresholdOutcome::Ok
    }

    /// Build the alert for a violation, `None` when the outcome is `Ok`
    pub fn alert_for(
        metric: &MonitoredMetric,
        sample: &MetricSample,
        outcome: ThresholdOutcome,
    ) -> Option<Alert> {
        let ThresholdOutcome::Violation {
            severity,
            bound,
            limit,
        } = outcome
        else {
            return None;
        };

        Some(Alert {
            title: format!("Threshold violation: {}", metric.display_name()),
            description: format!(
                "Value {:.4} is {} {:.4} on device {}",
                sample.value,
                bound.describe(),
                limit,
                metric.device_id
            ),
            severity,
            source: AlertSource::Threshold,
            metric_id: metric.id,
            device_id: metric.device_id,
            detail: AlertDetail::Threshold(ThresholdBreach {
                timestamp: sample.timestamp,
                value: sample.value,
                bound,
                limit,
            }),
            status: AlertStatus::New,
            created_at: chrono::Utc::now(),
        })
    }
}

fn violation(severity: Severity, bound: Bound, limit: f64) -> ThresholdOutcome {
    ThresholdOutcome::Violation {
        severity,
        bound,
        limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceId, MetricDefinition, MetricId};

    fn limits() -> ThresholdLimits {
        ThresholdLimits {
            min: Some(0.0),
            max: Some(100.0),
            warning_min: Some(10.0),
            warning_max: Some(80.0),
        }
    }

    #[test]
    fn test_within_limits() {
        assert_eq!(ThresholdEvaluator::evaluate(50.0, &limits()), ThresholdOutcome::Ok);
        // Boundaries are inclusive
        assert_eq!(ThresholdEvaluator::evaluate(80.0, &limits()), ThresholdOutcome::Ok);
        assert_eq!(ThresholdEvaluator::evaluate(10.0, &limits()), ThresholdOutcome::Ok);
    }

    #[test]
    fn test_hard_limits_are_critical() {
        let outcome = ThresholdEvaluator::evaluate(120.0, &limits());
        assert_eq!(
            outcome,
            ThresholdOutcome::Violation {
                severity: Severity::Critical,
                bound: Bound::Max,
                limit: 100.0
            }
        );
        assert_eq!(
            ThresholdEvaluator::evaluate(-1.0, &limits()).severity(),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn test_warning_limits_are_medium() {
        let high = ThresholdEvaluator::evaluate(85.0, &limits());
        assert_eq!(high.severity(), Some(Severity::Medium));
        let low = ThresholdEvaluator::evaluate(5.0, &limits());
        assert!(matches!(
            low,
            ThresholdOutcome::Violation {
                bound: Bound::WarningMin,
                ..
            }
        ));
    }

    #[test]
    fn test_unset_limits_never_fire() {
        let none = ThresholdLimits::default();
        assert!(!ThresholdEvaluator::evaluate(f64::MAX, &none).is_violation());
        assert!(!ThresholdEvaluator::evaluate(f64::MIN, &none).is_violation());
    }

    #[test]
    fn test_alert_for_violation() {
        let metric = MonitoredMetric {
            id: MetricId(7),
            device_id: DeviceId(3),
            definition: MetricDefinition {
                id: 1,
                name: "cpu_usage".to_string(),
                unit: "%".to_string(),
                collection_method: "snmp".to_string(),
            },
            active: true,
            collection_interval_secs: 60,
            thresholds: limits(),
            last_value: None,
            last_collected_at: None,
        };
        let sample = MetricSample::new(MetricId(7), chrono::Utc::now(), 120.0);
        let outcome = ThresholdEvaluator::evaluate(sample.value, &metric.thresholds);

        let alert = ThresholdEvaluator::alert_for(&metric, &sample, outcome).unwrap();
        assert_eq!(alert.source, AlertSource::Threshold);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.device_id, DeviceId(3));
        assert!(alert.description.contains("above maximum"));

        assert!(ThresholdEvaluator::alert_for(&metric, &sample, ThresholdOutcome::Ok).is_none());
    }
}
