//! In-memory collaborators
//!
//! Samples are kept per metric in timestamp order with bounded retention,
//! similar to a ring buffer that evicts from the front.

use super::{AlertSink, MetricCatalog, MetricSampleStore, SampleWriter};
use crate::error::Result;
use crate::models::{Alert, AlertSource, DeviceId, MetricId, MetricSample, MonitoredMetric};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Default sample retention (35 days, enough for a 30 day lookback)
const DEFAULT_RETENTION_DAYS: i64 = 35;

/// Sample store holding every metric's history in memory
pub struct InMemorySampleStore {
    series: RwLock<HashMap<MetricId, Vec<MetricSample>>>,
    retention: Duration,
}

impl Default for InMemorySampleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySampleStore {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    /// Set custom retention
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Bulk load, used for seeding and tests
    pub async fn extend(&self, samples: impl IntoIterator<Item = MetricSample>) {
        let mut series = self.series.write().await;
        for sample in samples {
            insert_ordered(series.entry(sample.metric_id).or_default(), sample);
        }
    }

    /// Number of samples held for a metric
    pub async fn len(&self, metric_id: MetricId) -> usize {
        let series = self.series.read().await;
        series.get(&metric_id).map(Vec::len).unwrap_or(0)
    }

    /// Total samples across all metrics
    pub async fn total_samples(&self) -> usize {
        let series = self.series.read().await;
        series.values().map(Vec::len).sum()
    }
}

/// Insert after any existing sample with the same timestamp so duplicates
/// keep arrival order.
fn insert_ordered(samples: &mut Vec<MetricSample>, sample: MetricSample) {
    let idx = samples.partition_point(|s| s.timestamp <= sample.timestamp);
    samples.insert(idx, sample);
}

#[async_trait]
impl MetricSampleStore for InMemorySampleStore {
    async fn query(
        &self,
        metric_id: MetricId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>> {
        if end < start {
            return Ok(Vec::new());
        }

        let series = self.series.read().await;
        let Some(samples) = series.get(&metric_id) else {
            return Ok(Vec::new());
        };

        let from = samples.partition_point(|s| s.timestamp < start);
        let to = samples.partition_point(|s| s.timestamp <= end);
        Ok(samples[from..to].to_vec())
    }
}

#[async_trait]
impl SampleWriter for InMemorySampleStore {
    async fn append(&self, sample: MetricSample) -> Result<()> {
        let mut series = self.series.write().await;
        let samples = series.entry(sample.metric_id).or_default();
        insert_ordered(samples, sample);

        // Evict samples that fell out of retention
        if let Some(latest) = samples.last().map(|s| s.timestamp) {
            let cutoff = latest - self.retention;
            let expired = samples.partition_point(|s| s.timestamp < cutoff);
            if expired > 0 {
                samples.drain(..expired);
                debug!(metric_id = %sample.metric_id, expired, "Evicted expired samples");
            }
        }

        Ok(())
    }
}

/// Metric catalog backed by a map
#[derive(Default)]
pub struct InMemoryCatalog {
    metrics: RwLock<HashMap<MetricId, MonitoredMetric>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from an initial set of metrics
    pub fn with_metrics(metrics: impl IntoIterator<Item = MonitoredMetric>) -> Self {
        Self {
            metrics: RwLock::new(metrics.into_iter().map(|m| (m.id, m)).collect()),
        }
    }

    /// Register or replace a metric
    pub async fn upsert(&self, metric: MonitoredMetric) {
        let mut metrics = self.metrics.write().await;
        metrics.insert(metric.id, metric);
    }

    /// Disable monitoring; the record is kept
    pub async fn deactivate(&self, metric_id: MetricId) -> bool {
        let mut metrics = self.metrics.write().await;
        match metrics.get_mut(&metric_id) {
            Some(metric) => {
                metric.active = false;
                true
            }
            None => false,
        }
    }

    /// Drop a metric entirely
    pub async fn remove(&self, metric_id: MetricId) -> Option<MonitoredMetric> {
        let mut metrics = self.metrics.write().await;
        metrics.remove(&metric_id)
    }

    pub async fn len(&self) -> usize {
        self.metrics.read().await.len()
    }
}

#[async_trait]
impl MetricCatalog for InMemoryCatalog {
    async fn get_by_id(&self, metric_id: MetricId) -> Result<Option<MonitoredMetric>> {
        let metrics = self.metrics.read().await;
        Ok(metrics.get(&metric_id).cloned())
    }

    async fn get_by_device(&self, device_id: DeviceId) -> Result<Vec<MonitoredMetric>> {
        let metrics = self.metrics.read().await;
        let mut found: Vec<MonitoredMetric> = metrics
            .values()
            .filter(|m| m.device_id == device_id)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.id);
        Ok(found)
    }

    async fn get_active(&self) -> Result<Vec<MonitoredMetric>> {
        let metrics = self.metrics.read().await;
        let mut found: Vec<MonitoredMetric> =
            metrics.values().filter(|m| m.active).cloned().collect();
        found.sort_by_key(|m| m.id);
        Ok(found)
    }

    async fn record_last_value(
        &self,
        metric_id: MetricId,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut metrics = self.metrics.write().await;
        if let Some(metric) = metrics.get_mut(&metric_id) {
            // Late samples must not roll the last-collected value backwards
            if metric.last_collected_at.map_or(true, |prev| at >= prev) {
                metric.last_value = Some(value);
                metric.last_collected_at = Some(at);
            }
        }
        Ok(())
    }
}

/// Alert sink that keeps alerts in memory
#[derive(Default)]
pub struct InMemoryAlertSink {
    alerts: RwLock<Vec<Alert>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every alert created so far, oldest first
    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }
}

#[async_trait]
impl AlertSink for InMemoryAlertSink {
    async fn create(&self, alert: Alert) -> Result<()> {
        let mut alerts = self.alerts.write().await;
        alerts.push(alert);
        Ok(())
    }

    async fn query_anomaly_alerts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        device_id: Option<DeviceId>,
    ) -> Result<Vec<Alert>> {
        let alerts = self.alerts.read().await;
        let mut found: Vec<Alert> = alerts
            .iter()
            .filter(|a| a.source == AlertSource::AnomalyDetection)
            .filter(|a| a.created_at >= start && a.created_at <= end)
            .filter(|a| device_id.map_or(true, |d| a.device_id == d))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}
