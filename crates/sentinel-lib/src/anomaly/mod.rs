//! Anomaly detection over historical sample windows
//!
//! This module provides:
//! - Three pluggable detectors (mean/std-dev band, z-score, IQR fences)
//! - Table-driven severity classification
//! - The detection engine that ties detectors and classifier together
//! - Alert dispatch with duplicate suppression

mod dispatcher;
mod engine;
mod iqr;
mod severity;
mod statistical;
mod stats;
mod zscore;

pub use dispatcher::{AlertDispatcher, DispatcherConfig, EmitOutcome, DEFAULT_DEDUP_WINDOW};
pub use engine::{AnomalyDetectionEngine, DetectionOutcome, DetectionStatus};
pub use iqr::IqrDetector;
pub use severity::{SeverityClassifier, SeverityScale};
pub use statistical::StatisticalDetector;
pub use stats::{Quartiles, WindowStats};
pub use zscore::ZScoreDetector;

use crate::models::{Algorithm, ExpectedRange, MetricSample, Sensitivity};
use chrono::{DateTime, Utc};

/// Minimum window for the mean/std-dev based detectors
pub const MIN_SAMPLES_STATISTICAL: usize = 3;

/// Minimum window for the quartile based detector
pub const MIN_SAMPLES_IQR: usize = 10;

/// A flagged sample before severity has been assigned
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub deviation: f64,
    pub scale: f64,
    pub expected_range: ExpectedRange,
}

/// Trait for detection algorithm implementations
///
/// Detectors only look at values. Samples arrive in ascending timestamp
/// order and must not be re-sorted.
pub trait Detector: Send + Sync {
    /// Algorithm this detector implements
    fn algorithm(&self) -> Algorithm;

    /// Smallest window the detector will run on
    fn min_samples(&self) -> usize;

    /// Flag samples outside the sensitivity-derived band
    fn detect(&self, samples: &[MetricSample], sensitivity: Sensitivity) -> Vec<Candidate>;
}
