//! Error types for the detection pipeline

use thiserror::Error;

use crate::models::MetricId;

/// Errors raised by the pipeline and its collaborators
///
/// Benign conditions (insufficient data, empty scopes) are reported through
/// status types and reports instead of this enum.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("sample store unavailable: {0}")]
    Store(String),

    #[error("metric catalog unavailable: {0}")]
    Catalog(String),

    #[error("alert sink rejected alert: {0}")]
    AlertSink(String),

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("metric {0} not found")]
    MetricNotFound(MetricId),

    #[error("detection for metric {metric_id} timed out after {timeout_ms} ms")]
    Timeout { metric_id: MetricId, timeout_ms: u64 },

    #[error("invalid sensitivity {0}: must be within [0, 1]")]
    InvalidSensitivity(f64),

    #[error("unknown algorithm {0:?}")]
    UnknownAlgorithm(String),

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("metric {0} is already being analyzed")]
    LeaseConflict(MetricId),
}

impl SentinelError {
    /// Short machine-readable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SentinelError::Store(_) => "store",
            SentinelError::Catalog(_) => "catalog",
            SentinelError::AlertSink(_) => "alert_sink",
            SentinelError::InvalidSample(_) => "invalid_sample",
            SentinelError::InvalidRequest(_) => "invalid_request",
            SentinelError::MetricNotFound(_) => "metric_not_found",
            SentinelError::Timeout { .. } => "timeout",
            SentinelError::InvalidSensitivity(_) => "invalid_sensitivity",
            SentinelError::UnknownAlgorithm(_) => "unknown_algorithm",
            SentinelError::NotImplemented(_) => "not_implemented",
            SentinelError::LeaseConflict(_) => "lease_conflict",
        }
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
