//! Alert emission for detected anomalies
//!
//! Handles:
//! - Resolving the owning metric (a metric deleted mid-run is skipped quietly)
//! - Building the alert record with the anomaly as its detail payload
//! - Suppressing repeat alerts for the same point across overlapping runs

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::Result;
use crate::models::{
    Alert, AlertDetail, AlertSource, AlertStatus, Algorithm, Anomaly, MetricId, MonitoredMetric,
};
use crate::store::{AlertSink, MetricCatalog};

/// Default deduplication window (30 days, the default lookback)
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long an emitted point stays suppressed
    pub dedup_window: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

/// What happened to an anomaly handed to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Created,
    /// Same metric, timestamp and algorithm already alerted
    Duplicate,
    /// Owning metric no longer exists
    MetricMissing,
}

impl EmitOutcome {
    pub fn created(&self) -> bool {
        matches!(self, EmitOutcome::Created)
    }
}

/// Key for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    metric_id: MetricId,
    timestamp_micros: i64,
    algorithm: Algorithm,
}

impl DedupKey {
    fn for_anomaly(anomaly: &Anomaly) -> Self {
        Self {
            metric_id: anomaly.metric_id,
            timestamp_micros: anomaly.timestamp.timestamp_micros(),
            algorithm: anomaly.algorithm,
        }
    }
}

/// Turns anomalies into alerts
pub struct AlertDispatcher {
    catalog: Arc<dyn MetricCatalog>,
    sink: Arc<dyn AlertSink>,
    config: DispatcherConfig,
    /// Recently emitted points (key -> emission time)
    emitted: DashMap<DedupKey, Instant>,
}

impl AlertDispatcher {
    pub fn new(catalog: Arc<dyn MetricCatalog>, sink: Arc<dyn AlertSink>) -> Self {
        Self::with_config(catalog, sink, DispatcherConfig::default())
    }

    pub fn with_config(
        catalog: Arc<dyn MetricCatalog>,
        sink: Arc<dyn AlertSink>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            catalog,
            sink,
            config,
            emitted: DashMap::new(),
        }
    }

    /// Create an alert for `anomaly`
    ///
    /// Sink failures are returned to the caller, which counts them without
    /// aborting the batch.
    pub async fn emit(&self, anomaly: &Anomaly) -> Result<EmitOutcome> {
        let Some(metric) = self.catalog.get_by_id(anomaly.metric_id).await? else {
            debug!(
                metric_id = %anomaly.metric_id,
                "Metric disappeared before dispatch, dropping anomaly"
            );
            return Ok(EmitOutcome::MetricMissing);
        };

        let key = DedupKey::for_anomaly(anomaly);
        if !self.reserve(&key) {
            debug!(
                metric_id = %anomaly.metric_id,
                timestamp = %anomaly.timestamp,
                algorithm = %anomaly.algorithm,
                "Suppressing duplicate anomaly alert"
            );
            return Ok(EmitOutcome::Duplicate);
        }

        if let Err(e) = self.sink.create(Self::build_alert(&metric, anomaly)).await {
            self.emitted.remove(&key);
            return Err(e);
        }

        Ok(EmitOutcome::Created)
    }

    /// Alert record for an anomaly on `metric`
    pub fn build_alert(metric: &MonitoredMetric, anomaly: &Anomaly) -> Alert {
        Alert {
            title: format!(
                "{} anomaly detected: {}",
                capitalize(anomaly.severity.as_str()),
                metric.display_name()
            ),
            description: format!(
                "Value {:.4} at {} is outside the expected range [{:.4}, {:.4}] \
                 (algorithm: {}, deviation: {:.3}, sensitivity: {:.2}) on device {}",
                anomaly.value,
                anomaly.timestamp.to_rfc3339(),
                anomaly.expected_range.lower,
                anomaly.expected_range.upper,
                anomaly.algorithm,
                anomaly.deviation,
                anomaly.sensitivity,
                metric.device_id
            ),
            severity: anomaly.severity,
            source: AlertSource::AnomalyDetection,
            metric_id: metric.id,
            device_id: metric.device_id,
            detail: AlertDetail::Anomaly(anomaly.clone()),
            status: AlertStatus::New,
            created_at: chrono::Utc::now(),
        }
    }

    /// Claim `key` for emission; `false` when it was emitted within the window
    ///
    /// The claim is taken before the sink call so concurrent emitters of the
    /// same point cannot both create an alert.
    fn reserve(&self, key: &DedupKey) -> bool {
        match self.emitted.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().elapsed() < self.config.dedup_window {
                    return false;
                }
                entry.insert(Instant::now());
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                true
            }
        }
    }

    /// Clear expired deduplication entries
    pub fn cleanup_dedup_cache(&self) {
        let window = self.config.dedup_window;
        self.emitted.retain(|_, emitted_at| emitted_at.elapsed() < window);
    }

    /// Number of points currently tracked for deduplication
    pub fn tracked_points(&self) -> usize {
        self.emitted.len()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
