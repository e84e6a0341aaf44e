//! Anomaly alert summaries
//!
//! Aggregates the anomaly alerts raised in a period for reporting.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};
use crate::models::{Alert, DeviceId, MetricId};
use crate::store::AlertSink;

/// Default number of recent alerts included in a summary
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Alert count for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAnomalyCount {
    pub metric_id: MetricId,
    pub device_id: DeviceId,
    pub count: usize,
}

/// Anomaly alerts in a period, grouped for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    pub total_anomalies: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_algorithm: BTreeMap<String, usize>,
    /// Most affected metrics first
    pub by_metric: Vec<MetricAnomalyCount>,
    pub by_device: BTreeMap<DeviceId, usize>,
    pub recent_alerts: Vec<Alert>,
}

/// Builds [`AnomalySummary`] reports from the alert sink
pub struct AnomalyAnalyzer {
    sink: Arc<dyn AlertSink>,
    recent_limit: usize,
}

impl AnomalyAnalyzer {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    /// Summarize anomaly alerts created within `[start, end]`
    pub async fn summarize(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        device_id: Option<DeviceId>,
    ) -> Result<AnomalySummary> {
        if start > end {
            return Err(SentinelError::InvalidRequest(format!(
                "analysis period starts after it ends ({} > {})",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }

        let alerts = self.sink.query_anomaly_alerts(start, end, device_id).await?;

        let mut by_severity = BTreeMap::new();
        let mut by_algorithm = BTreeMap::new();
        let mut by_device = BTreeMap::new();
        let mut by_metric: HashMap<MetricId, MetricAnomalyCount> = HashMap::new();

        for alert in &alerts {
            *by_severity
                .entry(alert.severity.as_str().to_string())
                .or_insert(0) += 1;
            if let Some(anomaly) = alert.anomaly() {
                *by_algorithm
                    .entry(anomaly.algorithm.as_str().to_string())
                    .or_insert(0) += 1;
            }
            *by_device.entry(alert.device_id).or_insert(0) += 1;
            by_metric
                .entry(alert.metric_id)
                .or_insert_with(|| MetricAnomalyCount {
                    metric_id: alert.metric_id,
                    device_id: alert.device_id,
                    count: 0,
                })
                .count += 1;
        }

        let mut by_metric: Vec<MetricAnomalyCount> = by_metric.into_values().collect();
        by_metric.sort_by(|a, b| b.count.cmp(&a.count).then(a.metric_id.cmp(&b.metric_id)));

        let total_anomalies = alerts.len();
        let recent_alerts = alerts.into_iter().take(self.recent_limit).collect();

        Ok(AnomalySummary {
            period_start: start,
            period_end: end,
            device_id,
            total_anomalies,
            by_severity,
            by_algorithm,
            by_metric,
            by_device,
            recent_alerts,
        })
    }
}
