//! Run results
//!
//! Per-metric results are aggregated into a single [`DetectionReport`] that
//! callers serialize as-is.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DetectionScope;
use crate::error::SentinelError;
use crate::models::{Algorithm, DeviceId, MetricId, MonitoredMetric};

/// What happened to a single metric in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricRunStatus {
    /// Detector ran over a full window
    Analyzed,
    /// Window was below the detector minimum
    InsufficientData,
    /// Another run held the metric's lease
    Skipped,
    /// Query, detection or timeout failure
    Failed,
}

/// Outcome for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRunResult {
    pub metric_id: MetricId,
    pub device_id: DeviceId,
    pub status: MetricRunStatus,
    pub samples_analyzed: usize,
    pub anomalies_found: usize,
    pub alerts_created: usize,
    pub duplicates_suppressed: usize,
    pub alert_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl MetricRunResult {
    pub(crate) fn new(metric: &MonitoredMetric, status: MetricRunStatus) -> Self {
        Self {
            metric_id: metric.id,
            device_id: metric.device_id,
            status,
            samples_analyzed: 0,
            anomalies_found: 0,
            alerts_created: 0,
            duplicates_suppressed: 0,
            alert_failures: 0,
            detail: None,
            duration_ms: 0,
        }
    }

    pub(crate) fn skipped(metric: &MonitoredMetric) -> Self {
        let mut result = Self::new(metric, MetricRunStatus::Skipped);
        result.detail = Some(SentinelError::LeaseConflict(metric.id).to_string());
        result
    }

    pub(crate) fn failed(metric: &MonitoredMetric, message: impl Into<String>) -> Self {
        let mut result = Self::new(metric, MetricRunStatus::Failed);
        result.detail = Some(message.into());
        result
    }

    pub(crate) fn insufficient(
        metric: &MonitoredMetric,
        required: usize,
        available: usize,
    ) -> Self {
        let mut result = Self::new(metric, MetricRunStatus::InsufficientData);
        result.samples_analyzed = available;
        result.detail = Some(format!(
            "insufficient data: need at least {} samples, found {}",
            required, available
        ));
        result
    }

    /// Counted in `metrics_analyzed`
    pub fn was_attempted(&self) -> bool {
        self.status != MetricRunStatus::Skipped
    }
}

/// A metric that failed inside an otherwise successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFailure {
    pub metric_id: MetricId,
    pub device_id: DeviceId,
    pub error: String,
}

/// Aggregated result of a scoped run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub scope: DetectionScope,
    pub algorithm: Algorithm,
    pub sensitivity: f64,
    pub metrics_analyzed: usize,
    pub anomalies_found: usize,
    pub alerts_created: usize,
    pub duplicates_suppressed: usize,
    pub alert_failures: usize,
    pub errors: Vec<MetricFailure>,
    pub error_count: usize,
    #[serde(default)]
    pub skipped: Vec<MetricId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_results: Option<Vec<MetricRunResult>>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl DetectionReport {
    /// Unsuccessful report for a run that never reached a detector
    pub fn rejected(
        scope: DetectionScope,
        algorithm: Algorithm,
        sensitivity: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            scope,
            algorithm,
            sensitivity,
            metrics_analyzed: 0,
            anomalies_found: 0,
            alerts_created: 0,
            duplicates_suppressed: 0,
            alert_failures: 0,
            errors: Vec::new(),
            error_count: 0,
            skipped: Vec::new(),
            devices_processed: None,
            metric_results: None,
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Fold per-metric results into a report
    ///
    /// A single-metric run succeeds only if its metric was analyzed (or
    /// skipped because another run is already on it). Device and global runs
    /// succeed once their scope resolved; per-metric failures are listed in
    /// `errors`.
    pub fn aggregate(
        scope: DetectionScope,
        algorithm: Algorithm,
        sensitivity: f64,
        mut results: Vec<MetricRunResult>,
    ) -> Self {
        results.sort_by_key(|r| r.metric_id);

        let mut report = Self::rejected(scope, algorithm, sensitivity, String::new());
        report.message = None;
        report.success = true;

        for result in &results {
            if result.was_attempted() {
                report.metrics_analyzed += 1;
            }
            report.anomalies_found += result.anomalies_found;
            report.alerts_created += result.alerts_created;
            report.duplicates_suppressed += result.duplicates_suppressed;
            report.alert_failures += result.alert_failures;

            match result.status {
                MetricRunStatus::Failed => report.errors.push(MetricFailure {
                    metric_id: result.metric_id,
                    device_id: result.device_id,
                    error: result.detail.clone().unwrap_or_default(),
                }),
                MetricRunStatus::Skipped => report.skipped.push(result.metric_id),
                MetricRunStatus::Analyzed | MetricRunStatus::InsufficientData => {}
            }
        }
        report.error_count = report.errors.len();

        match scope {
            DetectionScope::Metric(_) => {
                if let Some(result) = results.first() {
                    match result.status {
                        MetricRunStatus::Analyzed => {}
                        MetricRunStatus::Skipped => report.message = result.detail.clone(),
                        MetricRunStatus::InsufficientData | MetricRunStatus::Failed => {
                            report.success = false;
                            report.message = result.detail.clone();
                        }
                    }
                }
            }
            DetectionScope::Device(_) | DetectionScope::Global => {
                let devices: BTreeSet<DeviceId> = results.iter().map(|r| r.device_id).collect();
                report.devices_processed = Some(devices.len());
                report.metric_results = Some(results);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricDefinition, ThresholdLimits};

    fn metric(id: u64, device: u64) -> MonitoredMetric {
        MonitoredMetric {
            id: MetricId(id),
            device_id: DeviceId(device),
            definition: MetricDefinition {
                id: 1,
                name: "cpu_util".to_string(),
                unit: "%".to_string(),
                collection_method: "snmp".to_string(),
            },
            active: true,
            collection_interval_secs: 60,
            thresholds: ThresholdLimits::default(),
            last_value: None,
            last_collected_at: None,
        }
    }

    fn analyzed(id: u64, device: u64, anomalies: usize, created: usize) -> MetricRunResult {
        let mut result = MetricRunResult::new(&metric(id, device), MetricRunStatus::Analyzed);
        result.samples_analyzed = 20;
        result.anomalies_found = anomalies;
        result.alerts_created = created;
        result.duplicates_suppressed = anomalies - created;
        result
    }

    #[test]
    fn test_global_aggregation_counts_failures() {
        let results = vec![
            analyzed(3, 1, 2, 2),
            MetricRunResult::failed(&metric(2, 1), "sample store unavailable: boom"),
            analyzed(1, 2, 1, 0),
            MetricRunResult::skipped(&metric(4, 2)),
        ];

        let report =
            DetectionReport::aggregate(DetectionScope::Global, Algorithm::ZScore, 0.5, results);

        assert!(report.success);
        assert_eq!(report.metrics_analyzed, 3);
        assert_eq!(report.anomalies_found, 3);
        assert_eq!(report.alerts_created, 2);
        assert_eq!(report.duplicates_suppressed, 1);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].metric_id, MetricId(2));
        assert_eq!(report.skipped, vec![MetricId(4)]);
        assert_eq!(report.devices_processed, Some(2));

        let ids: Vec<MetricId> = report
            .metric_results
            .as_ref()
            .unwrap()
            .iter()
            .map(|r| r.metric_id)
            .collect();
        assert_eq!(ids, vec![MetricId(1), MetricId(2), MetricId(3), MetricId(4)]);
    }

    #[test]
    fn test_single_metric_insufficient_is_unsuccessful() {
        let results = vec![MetricRunResult::insufficient(&metric(7, 1), 3, 2)];
        let report = DetectionReport::aggregate(
            DetectionScope::Metric(MetricId(7)),
            Algorithm::Statistical,
            0.5,
            results,
        );

        assert!(!report.success);
        assert_eq!(report.metrics_analyzed, 1);
        assert!(report.message.unwrap().contains("insufficient data"));
        assert!(report.metric_results.is_none());
        assert!(report.devices_processed.is_none());
    }

    #[test]
    fn test_single_metric_skip_is_successful() {
        let results = vec![MetricRunResult::skipped(&metric(7, 1))];
        let report = DetectionReport::aggregate(
            DetectionScope::Metric(MetricId(7)),
            Algorithm::Statistical,
            0.5,
            results,
        );

        assert!(report.success);
        assert_eq!(report.metrics_analyzed, 0);
        assert_eq!(report.skipped, vec![MetricId(7)]);
        assert!(report.message.unwrap().contains("already being analyzed"));
    }

    #[test]
    fn test_report_serialization_omits_empty_optionals() {
        let report = DetectionReport::rejected(
            DetectionScope::Device(DeviceId(3)),
            Algorithm::Iqr,
            0.5,
            "no active metrics for device 3",
        );
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["algorithm"], "isolation_forest");
        assert_eq!(json["scope"]["kind"], "device");
        assert_eq!(json["scope"]["id"], 3);
        assert!(json.get("metric_results").is_none());
        assert!(json.get("devices_processed").is_none());
    }
}
