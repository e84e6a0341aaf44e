//! Detection engine
//!
//! Dispatches a sample window to the detector registered for the requested
//! algorithm and classifies every candidate it returns.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    Detector, IqrDetector, SeverityClassifier, SeverityScale, StatisticalDetector, ZScoreDetector,
};
use crate::error::{Result, SentinelError};
use crate::models::{Algorithm, Anomaly, MetricId, MetricSample, Sensitivity};

/// Whether the detector actually ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectionStatus {
    Completed,
    InsufficientData { required: usize, available: usize },
}

/// Output of one detection pass over a window
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub status: DetectionStatus,
    pub anomalies: Vec<Anomaly>,
    pub samples_analyzed: usize,
}

impl DetectionOutcome {
    fn insufficient(required: usize, available: usize) -> Self {
        Self {
            status: DetectionStatus::InsufficientData {
                required,
                available,
            },
            anomalies: Vec::new(),
            samples_analyzed: available,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self.status, DetectionStatus::InsufficientData { .. })
    }
}

/// Runs the registered detectors and assigns severities
pub struct AnomalyDetectionEngine {
    detectors: HashMap<Algorithm, Arc<dyn Detector>>,
    classifier: SeverityClassifier,
}

impl Default for AnomalyDetectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyDetectionEngine {
    /// Engine with the statistical, z-score and IQR detectors
    pub fn new() -> Self {
        let mut engine = Self::with_classifier(SeverityClassifier::new());
        engine.register(Arc::new(StatisticalDetector::new()));
        engine.register(Arc::new(ZScoreDetector::new()));
        engine.register(Arc::new(IqrDetector::new()));
        engine
    }

    /// Engine with no detectors, classifying through `classifier`
    pub fn with_classifier(classifier: SeverityClassifier) -> Self {
        Self {
            detectors: HashMap::new(),
            classifier,
        }
    }

    /// Register a detector for its algorithm
    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.insert(detector.algorithm(), detector);
    }

    /// Register a detector together with its severity scale
    pub fn register_with_scale(&mut self, detector: Arc<dyn Detector>, scale: SeverityScale) {
        self.classifier.register(detector.algorithm(), scale);
        self.register(detector);
    }

    pub fn supports(&self, algorithm: Algorithm) -> bool {
        self.detectors.contains_key(&algorithm)
    }

    pub fn classifier(&self) -> &SeverityClassifier {
        &self.classifier
    }

    /// Detect anomalies in `samples`, which must be in ascending timestamp
    /// order and belong to `metric_id`.
    ///
    /// A window below the detector's minimum is not an error; the outcome
    /// carries `InsufficientData` and no anomalies.
    pub fn detect(
        &self,
        metric_id: MetricId,
        samples: &[MetricSample],
        algorithm: Algorithm,
        sensitivity: Sensitivity,
    ) -> Result<DetectionOutcome> {
        let detector = self.detectors.get(&algorithm).ok_or_else(|| {
            SentinelError::NotImplemented(format!("{} detector", algorithm))
        })?;

        let required = detector.min_samples();
        if samples.len() < required {
            return Ok(DetectionOutcome::insufficient(required, samples.len()));
        }

        let anomalies = detector
            .detect(samples, sensitivity)
            .into_iter()
            .map(|candidate| {
                let severity =
                    self.classifier
                        .classify(algorithm, candidate.deviation, candidate.scale)?;
                Ok(Anomaly {
                    metric_id,
                    timestamp: candidate.timestamp,
                    value: candidate.value,
                    algorithm,
                    sensitivity: sensitivity.value(),
                    deviation: candidate.deviation,
                    scale: candidate.scale,
                    severity,
                    expected_range: candidate.expected_range,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DetectionOutcome {
            status: DetectionStatus::Completed,
            anomalies,
            samples_analyzed: samples.len(),
        })
    }
}
