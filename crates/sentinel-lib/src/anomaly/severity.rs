//! Severity classification
//!
//! Every detector reports a deviation together with the unit it is measured
//! in. The classifier divides the two and compares the ratio against
//! per-algorithm multiples, so adding an algorithm only means registering
//! another scale.

use std::collections::HashMap;

use crate::error::{Result, SentinelError};
use crate::models::{Algorithm, Severity};

/// Multiples of the scale unit at which each tier starts (exclusive)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityScale {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl SeverityScale {
    pub const fn new(critical: f64, high: f64, medium: f64) -> Self {
        Self {
            critical,
            high,
            medium,
        }
    }

    fn tier(&self, ratio: f64) -> Severity {
        if ratio > self.critical {
            Severity::Critical
        } else if ratio > self.high {
            Severity::High
        } else if ratio > self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Multiples of σ
pub const STATISTICAL_SCALE: SeverityScale = SeverityScale::new(3.0, 2.0, 1.0);

/// Raw z-score cutoffs
pub const Z_SCORE_SCALE: SeverityScale = SeverityScale::new(3.0, 2.5, 2.0);

/// Multiples of the IQR
pub const IQR_SCALE: SeverityScale = SeverityScale::new(3.0, 2.0, 1.0);

/// Maps deviations to severity tiers using a per-algorithm table
#[derive(Debug, Clone)]
pub struct SeverityClassifier {
    scales: HashMap<Algorithm, SeverityScale>,
}

impl Default for SeverityClassifier {
    fn default() -> Self {
        let mut classifier = Self::empty();
        classifier.register(Algorithm::Statistical, STATISTICAL_SCALE);
        classifier.register(Algorithm::ZScore, Z_SCORE_SCALE);
        classifier.register(Algorithm::Iqr, IQR_SCALE);
        classifier
    }
}

impl SeverityClassifier {
    /// Classifier with the built-in scales
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier with no scales registered
    pub fn empty() -> Self {
        Self {
            scales: HashMap::new(),
        }
    }

    /// Register or replace the scale for an algorithm
    pub fn register(&mut self, algorithm: Algorithm, scale: SeverityScale) {
        self.scales.insert(algorithm, scale);
    }

    pub fn scale_for(&self, algorithm: Algorithm) -> Option<SeverityScale> {
        self.scales.get(&algorithm).copied()
    }

    /// Classify `deviation` measured in multiples of `scale_unit`
    pub fn classify(
        &self,
        algorithm: Algorithm,
        deviation: f64,
        scale_unit: f64,
    ) -> Result<Severity> {
        let scale = self.scale_for(algorithm).ok_or_else(|| {
            SentinelError::NotImplemented(format!("severity scale for {}", algorithm))
        })?;

        if scale_unit.is_nan() || scale_unit <= 0.0 || !deviation.is_finite() {
            return Ok(Severity::Low);
        }

        Ok(scale.tier(deviation.abs() / scale_unit))
    }
}
