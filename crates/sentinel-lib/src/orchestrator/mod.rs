//! Scoped detection runs
//!
//! A run resolves its scope to a set of active metrics, analyzes each one in
//! a bounded worker pool and folds the per-metric results into a
//! [`DetectionReport`]. A metric that fails, times out or is already being
//! analyzed elsewhere never aborts the rest of the run.

mod lease;
mod report;

pub use lease::{LeaseGuard, LeaseRegistry};
pub use report::{DetectionReport, MetricFailure, MetricRunResult, MetricRunStatus};

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::anomaly::{AlertDispatcher, AnomalyDetectionEngine, DetectionStatus, EmitOutcome};
use crate::error::{Result, SentinelError};
use crate::models::{Algorithm, Anomaly, DeviceId, MetricId, MonitoredMetric, Sensitivity};
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::store::{MetricCatalog, MetricSampleStore};

/// Default history window analyzed per metric
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Default number of metrics analyzed concurrently
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Default per-metric time budget
pub const DEFAULT_METRIC_TIMEOUT: Duration = Duration::from_secs(30);

/// Which metrics a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DetectionScope {
    Metric(MetricId),
    Device(DeviceId),
    Global,
}

impl DetectionScope {
    /// Scope from optional request filters; a metric filter wins over a device filter
    pub fn from_filters(metric_id: Option<MetricId>, device_id: Option<DeviceId>) -> Self {
        match (metric_id, device_id) {
            (Some(metric_id), _) => DetectionScope::Metric(metric_id),
            (None, Some(device_id)) => DetectionScope::Device(device_id),
            (None, None) => DetectionScope::Global,
        }
    }

    /// Label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            DetectionScope::Metric(_) => "metric",
            DetectionScope::Device(_) => "device",
            DetectionScope::Global => "global",
        }
    }
}

impl fmt::Display for DetectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionScope::Metric(id) => write!(f, "metric:{}", id),
            DetectionScope::Device(id) => write!(f, "device:{}", id),
            DetectionScope::Global => write!(f, "global"),
        }
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Resolving,
    Running,
    Aggregating,
    Done,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Resolving => "resolving",
            RunPhase::Running => "running",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Done => "done",
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// History analyzed per metric, ending now
    pub lookback: chrono::Duration,
    /// Upper bound on metrics analyzed at once
    pub max_concurrency: usize,
    /// Budget for one metric's query and detection; dispatch is not cut short
    pub metric_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lookback: chrono::Duration::days(DEFAULT_LOOKBACK_DAYS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            metric_timeout: DEFAULT_METRIC_TIMEOUT,
        }
    }
}

enum Resolution {
    Metrics(Vec<MonitoredMetric>),
    Empty(String),
}

/// Everything a worker needs to analyze one metric
#[derive(Clone)]
struct MetricWorker {
    store: Arc<dyn MetricSampleStore>,
    engine: Arc<AnomalyDetectionEngine>,
    dispatcher: Arc<AlertDispatcher>,
    lookback: chrono::Duration,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
}

/// Query and detection result for one metric, before dispatch
enum Detected {
    Insufficient(MetricRunResult),
    Analyzed {
        result: MetricRunResult,
        anomalies: Vec<Anomaly>,
    },
}

impl MetricWorker {
    /// Query the lookback window and run the detector
    async fn detect(
        &self,
        metric: &MonitoredMetric,
        algorithm: Algorithm,
        sensitivity: Sensitivity,
    ) -> Result<Detected> {
        let end = Utc::now();
        let start = end - self.lookback;
        let samples = self.store.query(metric.id, start, end).await?;

        let outcome = self
            .engine
            .detect(metric.id, &samples, algorithm, sensitivity)?;

        if let DetectionStatus::InsufficientData {
            required,
            available,
        } = outcome.status
        {
            debug!(
                metric_id = %metric.id,
                required = required,
                available = available,
                "Not enough samples for detection"
            );
            return Ok(Detected::Insufficient(MetricRunResult::insufficient(
                metric, required, available,
            )));
        }

        let mut result = MetricRunResult::new(metric, MetricRunStatus::Analyzed);
        result.samples_analyzed = outcome.samples_analyzed;
        result.anomalies_found = outcome.anomalies.len();

        Ok(Detected::Analyzed {
            result,
            anomalies: outcome.anomalies,
        })
    }

    /// Emit every anomaly, counting created, suppressed and failed alerts
    ///
    /// Runs to completion once started so that every alert the sink accepts
    /// is both counted and recorded for suppression.
    async fn dispatch(
        &self,
        metric: &MonitoredMetric,
        anomalies: &[Anomaly],
        result: &mut MetricRunResult,
    ) {
        for anomaly in anomalies {
            self.metrics
                .inc_anomalies_detected(anomaly.algorithm.as_str(), anomaly.severity.as_str());
            self.logger.log_anomaly(
                &metric.id.to_string(),
                &metric.device_id.to_string(),
                anomaly.algorithm.as_str(),
                anomaly.severity.as_str(),
                anomaly.value,
                anomaly.deviation,
            );

            match self.dispatcher.emit(anomaly).await {
                Ok(EmitOutcome::Created) => {
                    result.alerts_created += 1;
                    self.metrics.inc_alerts_created("anomaly_detection");
                }
                Ok(EmitOutcome::Duplicate) => {
                    result.duplicates_suppressed += 1;
                    self.metrics.inc_alerts_suppressed();
                }
                Ok(EmitOutcome::MetricMissing) => {}
                Err(e) => {
                    result.alert_failures += 1;
                    self.metrics.inc_alert_failures();
                    self.logger
                        .log_alert_failure(&metric.id.to_string(), &e.to_string());
                }
            }
        }
    }
}

/// Runs detection over a scope of metrics
pub struct DetectionOrchestrator {
    catalog: Arc<dyn MetricCatalog>,
    worker: MetricWorker,
    leases: LeaseRegistry,
    config: OrchestratorConfig,
}

impl DetectionOrchestrator {
    pub fn new(
        catalog: Arc<dyn MetricCatalog>,
        store: Arc<dyn MetricSampleStore>,
        engine: Arc<AnomalyDetectionEngine>,
        dispatcher: Arc<AlertDispatcher>,
        config: OrchestratorConfig,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            catalog,
            worker: MetricWorker {
                store,
                engine,
                dispatcher,
                lookback: config.lookback,
                metrics: SentinelMetrics::new(),
                logger,
            },
            leases: LeaseRegistry::new(),
            config,
        }
    }

    /// Share leases with other orchestrators in the same process
    pub fn with_leases(mut self, leases: LeaseRegistry) -> Self {
        self.leases = leases;
        self
    }

    pub fn leases(&self) -> &LeaseRegistry {
        &self.leases
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run detection over `scope`
    ///
    /// Invalid input and scopes without active metrics produce an
    /// unsuccessful report. Only a catalog failure while resolving the scope
    /// is returned as an error.
    pub async fn run(
        &self,
        scope: DetectionScope,
        algorithm: Algorithm,
        sensitivity: f64,
    ) -> Result<DetectionReport> {
        let started = Instant::now();
        let mut phase = RunPhase::Idle;

        let mut report = match self.run_phases(&mut phase, scope, algorithm, sensitivity).await {
            Ok(report) => report,
            Err(e) => {
                self.worker.metrics.inc_runs("failed");
                self.worker
                    .logger
                    .log_metric_failure(&scope.to_string(), e.kind(), &e.to_string());
                return Err(e);
            }
        };

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.transition(&mut phase, RunPhase::Done, scope);

        self.worker
            .metrics
            .observe_run_latency(scope.label(), started.elapsed().as_secs_f64());
        self.worker
            .metrics
            .inc_runs(if report.success { "success" } else { "rejected" });
        self.worker.logger.log_run_completed(
            &scope.to_string(),
            report.success,
            report.metrics_analyzed,
            report.anomalies_found,
            report.alerts_created,
            report.error_count,
            report.duration_ms,
        );

        Ok(report)
    }

    async fn run_phases(
        &self,
        phase: &mut RunPhase,
        scope: DetectionScope,
        algorithm: Algorithm,
        sensitivity: f64,
    ) -> Result<DetectionReport> {
        self.worker
            .logger
            .log_run_started(&scope.to_string(), algorithm.as_str(), sensitivity);

        let validated = match Sensitivity::new(sensitivity) {
            Ok(validated) => validated,
            Err(e) => {
                return Ok(DetectionReport::rejected(
                    scope,
                    algorithm,
                    sensitivity,
                    e.to_string(),
                ))
            }
        };

        if !self.worker.engine.supports(algorithm) {
            let message = SentinelError::NotImplemented(format!("{} detector", algorithm));
            return Ok(DetectionReport::rejected(
                scope,
                algorithm,
                sensitivity,
                message.to_string(),
            ));
        }

        self.transition(phase, RunPhase::Resolving, scope);
        let metrics = match self.resolve(scope).await? {
            Resolution::Metrics(metrics) => metrics,
            Resolution::Empty(message) => {
                return Ok(DetectionReport::rejected(
                    scope,
                    algorithm,
                    sensitivity,
                    message,
                ))
            }
        };

        self.transition(phase, RunPhase::Running, scope);
        let results = self.analyze_all(metrics, algorithm, validated).await;

        self.transition(phase, RunPhase::Aggregating, scope);
        let skipped = results
            .iter()
            .filter(|r| r.status == MetricRunStatus::Skipped)
            .count();
        self.worker
            .metrics
            .add_metrics_analyzed((results.len() - skipped) as u64);
        self.worker.metrics.add_metrics_skipped(skipped as u64);

        Ok(DetectionReport::aggregate(
            scope,
            algorithm,
            validated.value(),
            results,
        ))
    }

    fn transition(&self, phase: &mut RunPhase, next: RunPhase, scope: DetectionScope) {
        debug!(
            scope = %scope,
            from = phase.as_str(),
            to = next.as_str(),
            "Detection run phase change"
        );
        *phase = next;
    }

    async fn resolve(&self, scope: DetectionScope) -> Result<Resolution> {
        let resolution = match scope {
            DetectionScope::Metric(metric_id) => match self.catalog.get_by_id(metric_id).await? {
                None => Resolution::Empty(SentinelError::MetricNotFound(metric_id).to_string()),
                Some(metric) if !metric.active => {
                    Resolution::Empty(format!("metric {} is not active", metric_id))
                }
                Some(metric) => Resolution::Metrics(vec![metric]),
            },
            DetectionScope::Device(device_id) => {
                let active: Vec<MonitoredMetric> = self
                    .catalog
                    .get_by_device(device_id)
                    .await?
                    .into_iter()
                    .filter(|m| m.active)
                    .collect();
                if active.is_empty() {
                    Resolution::Empty(format!("no active metrics for device {}", device_id))
                } else {
                    Resolution::Metrics(active)
                }
            }
            DetectionScope::Global => {
                let active = self.catalog.get_active().await?;
                if active.is_empty() {
                    Resolution::Empty("no active metrics to analyze".to_string())
                } else {
                    Resolution::Metrics(active)
                }
            }
        };

        if let Resolution::Metrics(metrics) = &resolution {
            info!(scope = %scope, metrics = metrics.len(), "Resolved detection scope");
        }
        Ok(resolution)
    }

    /// Analyze every metric in a pool of at most `max_concurrency` workers
    async fn analyze_all(
        &self,
        metrics: Vec<MonitoredMetric>,
        algorithm: Algorithm,
        sensitivity: Sensitivity,
    ) -> Vec<MetricRunResult> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut results = Vec::with_capacity(metrics.len());
        let mut handles = Vec::with_capacity(metrics.len());

        for metric in metrics {
            let Some(lease) = self.leases.try_acquire(metric.id) else {
                info!(metric_id = %metric.id, "Metric already being analyzed, skipping");
                results.push(MetricRunResult::skipped(&metric));
                continue;
            };

            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    results.push(MetricRunResult::failed(&metric, e.to_string()));
                    continue;
                }
            };

            let worker = self.worker.clone();
            let timeout = self.config.metric_timeout;
            let task_metric = metric.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let _lease = lease;
                run_with_timeout(&worker, &task_metric, algorithm, sensitivity, timeout).await
            });
            handles.push((metric, handle));
        }

        for (metric, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let message = format!("detection task aborted: {}", e);
                    self.worker
                        .logger
                        .log_metric_failure(&metric.id.to_string(), "panic", &message);
                    MetricRunResult::failed(&metric, message)
                }
            };
            results.push(result);
        }

        results
    }
}

async fn run_with_timeout(
    worker: &MetricWorker,
    metric: &MonitoredMetric,
    algorithm: Algorithm,
    sensitivity: Sensitivity,
    timeout: Duration,
) -> MetricRunResult {
    let started = Instant::now();

    let detected = tokio::time::timeout(timeout, worker.detect(metric, algorithm, sensitivity))
        .await
        .unwrap_or_else(|_| {
            Err(SentinelError::Timeout {
                metric_id: metric.id,
                timeout_ms: timeout.as_millis() as u64,
            })
        });

    let mut result = match detected {
        Ok(Detected::Insufficient(result)) => result,
        Ok(Detected::Analyzed {
            mut result,
            anomalies,
        }) => {
            worker.dispatch(metric, &anomalies, &mut result).await;
            result
        }
        Err(e) => {
            worker.metrics.inc_detection_errors(e.kind());
            worker
                .logger
                .log_metric_failure(&metric.id.to_string(), e.kind(), &e.to_string());
            MetricRunResult::failed(metric, e.to_string())
        }
    };

    result.duration_ms = started.elapsed().as_millis() as u64;
    worker
        .metrics
        .observe_metric_latency(started.elapsed().as_secs_f64());
    result
}
