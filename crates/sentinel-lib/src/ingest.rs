//! Sample ingestion with the static-threshold fast path
//!
//! Every accepted sample is appended to the store, recorded as the metric's
//! last value and checked against the metric's configured limits. A crossed
//! limit raises a threshold alert straight away; statistical detection runs
//! later over the stored history.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SentinelError};
use crate::models::{MetricId, MetricSample, Severity};
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::store::{AlertSink, MetricCatalog, SampleWriter};
use crate::threshold::{ThresholdEvaluator, ThresholdOutcome};

/// Result of ingesting one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestOutcome {
    pub metric_id: MetricId,
    pub threshold: ThresholdOutcome,
    pub alert_created: bool,
}

/// A sample refused during batch ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSample {
    pub metric_id: MetricId,
    pub error: String,
}

/// Summary of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub accepted: usize,
    pub threshold_violations: usize,
    pub alerts_created: usize,
    pub rejected: Vec<RejectedSample>,
}

/// Accepts samples into the store and applies static limits
pub struct SampleIngestor {
    catalog: Arc<dyn MetricCatalog>,
    writer: Arc<dyn SampleWriter>,
    sink: Arc<dyn AlertSink>,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
}

impl SampleIngestor {
    pub fn new(
        catalog: Arc<dyn MetricCatalog>,
        writer: Arc<dyn SampleWriter>,
        sink: Arc<dyn AlertSink>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            catalog,
            writer,
            sink,
            metrics: SentinelMetrics::new(),
            logger,
        }
    }

    /// Ingest a single sample
    ///
    /// Samples for unknown metrics are refused. Inactive metrics still store
    /// their samples but skip threshold checks. A sink failure does not undo
    /// the append; the outcome reports `alert_created: false`.
    pub async fn ingest(&self, sample: MetricSample) -> Result<IngestOutcome> {
        if !sample.value.is_finite() {
            return Err(SentinelError::InvalidSample(format!(
                "non-finite value for metric {}",
                sample.metric_id
            )));
        }

        let metric = self
            .catalog
            .get_by_id(sample.metric_id)
            .await?
            .ok_or(SentinelError::MetricNotFound(sample.metric_id))?;

        self.writer.append(sample).await?;

        // The sample is stored at this point; a stale last value is not a rejection
        if let Err(e) = self
            .catalog
            .record_last_value(sample.metric_id, sample.value, sample.timestamp)
            .await
        {
            warn!(
                metric_id = %sample.metric_id,
                error = %e,
                "Failed to record last value"
            );
        }

        if !metric.active {
            debug!(metric_id = %metric.id, "Metric inactive, skipping threshold check");
            return Ok(IngestOutcome {
                metric_id: metric.id,
                threshold: ThresholdOutcome::Ok,
                alert_created: false,
            });
        }

        let threshold = ThresholdEvaluator::evaluate(sample.value, &metric.thresholds);
        let Some(alert) = ThresholdEvaluator::alert_for(&metric, &sample, threshold) else {
            return Ok(IngestOutcome {
                metric_id: metric.id,
                threshold,
                alert_created: false,
            });
        };

        if let ThresholdOutcome::Violation {
            severity, limit, ..
        } = threshold
        {
            self.metrics.inc_threshold_violations(severity.as_str());
            self.logger.log_threshold_violation(
                &metric.id.to_string(),
                severity.as_str(),
                sample.value,
                limit,
            );
        }

        let alert_created = match self.sink.create(alert).await {
            Ok(()) => {
                self.metrics.inc_alerts_created("threshold");
                true
            }
            Err(e) => {
                self.metrics.inc_alert_failures();
                self.logger
                    .log_alert_failure(&metric.id.to_string(), &e.to_string());
                false
            }
        };

        Ok(IngestOutcome {
            metric_id: metric.id,
            threshold,
            alert_created,
        })
    }

    /// Ingest samples in order, collecting per-sample failures
    pub async fn ingest_batch(&self, samples: Vec<MetricSample>) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for sample in samples {
            match self.ingest(sample).await {
                Ok(outcome) => {
                    summary.accepted += 1;
                    if outcome.threshold.is_violation() {
                        summary.threshold_violations += 1;
                    }
                    if outcome.alert_created {
                        summary.alerts_created += 1;
                    }
                }
                Err(e) => summary.rejected.push(RejectedSample {
                    metric_id: sample.metric_id,
                    error: e.to_string(),
                }),
            }
        }

        summary
    }
}

impl IngestOutcome {
    pub fn severity(&self) -> Option<Severity> {
        self.threshold.severity()
    }
}
