//! Observability infrastructure for the detection pipeline
//!
//! Provides:
//! - Prometheus metrics (run latency, per-metric latency, anomaly and alert counters)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for a whole detection run (in seconds)
const RUN_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Histogram buckets for a single metric's detection (in seconds)
const METRIC_LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct SentinelMetricsInner {
    run_latency_seconds: HistogramVec,
    metric_latency_seconds: Histogram,
    runs_total: IntCounterVec,
    metrics_analyzed: IntCounter,
    metrics_skipped: IntCounter,
    detection_errors: IntCounterVec,
    anomalies_detected: IntCounterVec,
    alerts_created: IntCounterVec,
    alerts_suppressed: IntCounter,
    alert_failures: IntCounter,
    threshold_violations: IntCounterVec,
    monitored_metrics: IntGauge,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            run_latency_seconds: register_histogram_vec!(
                "sentinel_detection_run_latency_seconds",
                "Wall-clock time of a scoped detection run",
                &["scope"],
                RUN_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detection_run_latency_seconds"),

            metric_latency_seconds: register_histogram!(
                "sentinel_metric_detection_latency_seconds",
                "Time spent querying, detecting and dispatching for one metric",
                METRIC_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register metric_detection_latency_seconds"),

            runs_total: register_int_counter_vec!(
                "sentinel_detection_runs_total",
                "Detection runs by outcome",
                &["outcome"]
            )
            .expect("Failed to register detection_runs_total"),

            metrics_analyzed: register_int_counter!(
                "sentinel_metrics_analyzed_total",
                "Metrics analyzed across all runs"
            )
            .expect("Failed to register metrics_analyzed_total"),

            metrics_skipped: register_int_counter!(
                "sentinel_metrics_skipped_total",
                "Metrics skipped because another run held their lease"
            )
            .expect("Failed to register metrics_skipped_total"),

            detection_errors: register_int_counter_vec!(
                "sentinel_detection_errors_total",
                "Per-metric detection failures by kind",
                &["kind"]
            )
            .expect("Failed to register detection_errors_total"),

            anomalies_detected: register_int_counter_vec!(
                "sentinel_anomalies_detected_total",
                "Anomalies detected by algorithm and severity",
                &["algorithm", "severity"]
            )
            .expect("Failed to register anomalies_detected_total"),

            alerts_created: register_int_counter_vec!(
                "sentinel_alerts_created_total",
                "Alerts created by source",
                &["source"]
            )
            .expect("Failed to register alerts_created_total"),

            alerts_suppressed: register_int_counter!(
                "sentinel_alerts_suppressed_total",
                "Anomaly alerts suppressed as duplicates"
            )
            .expect("Failed to register alerts_suppressed_total"),

            alert_failures: register_int_counter!(
                "sentinel_alert_failures_total",
                "Alerts the sink failed to create"
            )
            .expect("Failed to register alert_failures_total"),

            threshold_violations: register_int_counter_vec!(
                "sentinel_threshold_violations_total",
                "Static threshold violations by severity",
                &["severity"]
            )
            .expect("Failed to register threshold_violations_total"),

            monitored_metrics: register_int_gauge!(
                "sentinel_monitored_metrics",
                "Number of registered monitored metrics"
            )
            .expect("Failed to register monitored_metrics"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new)
    }

    pub fn observe_run_latency(&self, scope: &str, duration_secs: f64) {
        self.inner()
            .run_latency_seconds
            .with_label_values(&[scope])
            .observe(duration_secs);
    }

    pub fn observe_metric_latency(&self, duration_secs: f64) {
        self.inner().metric_latency_seconds.observe(duration_secs);
    }

    /// Count a finished run; `outcome` is "success", "rejected" or "failed"
    pub fn inc_runs(&self, outcome: &str) {
        self.inner().runs_total.with_label_values(&[outcome]).inc();
    }

    pub fn add_metrics_analyzed(&self, count: u64) {
        self.inner().metrics_analyzed.inc_by(count);
    }

    pub fn add_metrics_skipped(&self, count: u64) {
        self.inner().metrics_skipped.inc_by(count);
    }

    pub fn inc_detection_errors(&self, kind: &str) {
        self.inner().detection_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_anomalies_detected(&self, algorithm: &str, severity: &str) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[algorithm, severity])
            .inc();
    }

    pub fn inc_alerts_created(&self, source: &str) {
        self.inner().alerts_created.with_label_values(&[source]).inc();
    }

    pub fn inc_alerts_suppressed(&self) {
        self.inner().alerts_suppressed.inc();
    }

    pub fn inc_alert_failures(&self) {
        self.inner().alert_failures.inc();
    }

    pub fn inc_threshold_violations(&self, severity: &str) {
        self.inner()
            .threshold_violations
            .with_label_values(&[severity])
            .inc();
    }

    pub fn set_monitored_metrics(&self, count: i64) {
        self.inner().monitored_metrics.set(count);
    }
}

/// Structured logger for pipeline events
///
/// Provides consistent JSON-formatted logging for detection runs,
/// anomalies, and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log the start of a scoped run
    pub fn log_run_started(&self, scope: &str, algorithm: &str, sensitivity: f64) {
        info!(
            event = "detection_run_started",
            node = %self.node_name,
            scope = %scope,
            algorithm = %algorithm,
            sensitivity = sensitivity,
            "Detection run started"
        );
    }

    /// Log the outcome of a scoped run
    #[allow(clippy::too_many_arguments)]
    pub fn log_run_completed(
        &self,
        scope: &str,
        success: bool,
        metrics_analyzed: usize,
        anomalies_found: usize,
        alerts_created: usize,
        error_count: usize,
        duration_ms: u64,
    ) {
        if success {
            info!(
                event = "detection_run_completed",
                node = %self.node_name,
                scope = %scope,
                success = success,
                metrics_analyzed = metrics_analyzed,
                anomalies_found = anomalies_found,
                alerts_created = alerts_created,
                errors = error_count,
                duration_ms = duration_ms,
                "Detection run completed"
            );
        } else {
            warn!(
                event = "detection_run_completed",
                node = %self.node_name,
                scope = %scope,
                success = success,
                metrics_analyzed = metrics_analyzed,
                anomalies_found = anomalies_found,
                alerts_created = alerts_created,
                errors = error_count,
                duration_ms = duration_ms,
                "Detection run completed without success"
            );
        }
    }

    /// Log an anomaly detection event
    pub fn log_anomaly(
        &self,
        metric_id: &str,
        device_id: &str,
        algorithm: &str,
        severity: &str,
        value: f64,
        deviation: f64,
    ) {
        match severity {
            "critical" | "high" => {
                warn!(
                    event = "anomaly_detected",
                    node = %self.node_name,
                    metric_id = %metric_id,
                    device_id = %device_id,
                    algorithm = %algorithm,
                    severity = %severity,
                    value = value,
                    deviation = deviation,
                    "Severe anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    node = %self.node_name,
                    metric_id = %metric_id,
                    device_id = %device_id,
                    algorithm = %algorithm,
                    severity = %severity,
                    value = value,
                    deviation = deviation,
                    "Anomaly detected"
                );
            }
        }
    }

    /// Log a per-metric failure inside a run
    pub fn log_metric_failure(&self, metric_id: &str, kind: &str, error: &str) {
        warn!(
            event = "metric_detection_failed",
            node = %self.node_name,
            metric_id = %metric_id,
            kind = %kind,
            error = %error,
            "Detection failed for metric"
        );
    }

    /// Log an alert the sink refused
    pub fn log_alert_failure(&self, metric_id: &str, error: &str) {
        error!(
            event = "alert_creation_failed",
            node = %self.node_name,
            metric_id = %metric_id,
            error = %error,
            "Failed to create alert"
        );
    }

    /// Log a static threshold violation on ingestion
    pub fn log_threshold_violation(&self, metric_id: &str, severity: &str, value: f64, limit: f64) {
        warn!(
            event = "threshold_violation",
            node = %self.node_name,
            metric_id = %metric_id,
            severity = %severity,
            value = value,
            limit = limit,
            "Threshold violated"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            "Sentinel agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Sentinel agent shutting down"
        );
    }
}
