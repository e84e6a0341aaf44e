//! Collaborator interfaces consumed by the pipeline
//!
//! The pipeline never talks to a database directly. It reads samples through
//! [`MetricSampleStore`], resolves metrics through [`MetricCatalog`] and hands
//! alerts to an [`AlertSink`]. In-memory implementations live in [`memory`]
//! and back both the agent and the tests.

mod memory;

pub use memory::{InMemoryAlertSink, InMemoryCatalog, InMemorySampleStore};

use crate::error::Result;
use crate::models::{Alert, DeviceId, MetricId, MetricSample, MonitoredMetric};
use chrono::{DateTime, Utc};

pub use async_trait::async_trait;

/// Ordered, read-only access to historical samples
#[async_trait]
pub trait MetricSampleStore: Send + Sync {
    /// Samples for `metric_id` with `start <= timestamp <= end`, ascending by
    /// timestamp. An empty range yields an empty vec.
    async fn query(
        &self,
        metric_id: MetricId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>>;
}

/// Append-only ingestion side of the sample store
#[async_trait]
pub trait SampleWriter: Send + Sync {
    async fn append(&self, sample: MetricSample) -> Result<()>;
}

/// Lookup of monitored metrics
#[async_trait]
pub trait MetricCatalog: Send + Sync {
    async fn get_by_id(&self, metric_id: MetricId) -> Result<Option<MonitoredMetric>>;

    /// Every metric bound to the device, active or not
    async fn get_by_device(&self, device_id: DeviceId) -> Result<Vec<MonitoredMetric>>;

    /// Every active metric in the system
    async fn get_active(&self) -> Result<Vec<MonitoredMetric>>;

    /// Remember the most recently ingested value
    async fn record_last_value(
        &self,
        metric_id: MetricId,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Destination for created alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn create(&self, alert: Alert) -> Result<()>;

    /// Alerts raised by anomaly detection within `[start, end]`, newest first
    async fn query_anomaly_alerts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        device_id: Option<DeviceId>,
    ) -> Result<Vec<Alert>>;
}
