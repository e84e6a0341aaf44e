//! Mean / standard deviation band detector
//!
//! Flags samples whose distance from the window mean exceeds a multiple of
//! the window standard deviation. Sensitivity 0 uses 3σ, sensitivity 1 uses 1σ.

use super::{Candidate, Detector, WindowStats, MIN_SAMPLES_STATISTICAL};
use crate::models::{Algorithm, ExpectedRange, MetricSample, Sensitivity};

/// Detects samples outside `mean ± σ·(3 − 2s)`
#[derive(Debug, Clone, Default)]
pub struct StatisticalDetector;

impl StatisticalDetector {
    pub fn new() -> Self {
        Self
    }

    /// Number of standard deviations tolerated at `sensitivity`
    pub fn sigma_multiple(sensitivity: Sensitivity) -> f64 {
        3.0 - sensitivity.value() * 2.0
    }
}

impl Detector for StatisticalDetector {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Statistical
    }

    fn min_samples(&self) -> usize {
        MIN_SAMPLES_STATISTICAL
    }

    fn detect(&self, samples: &[MetricSample], sensitivity: Sensitivity) -> Vec<Candidate> {
        let Some(stats) = WindowStats::from_samples(samples) else {
            return Vec::new();
        };

        // A flat window has nothing to deviate from
        if stats.is_flat() {
            return Vec::new();
        }

        let threshold = stats.std_dev * Self::sigma_multiple(sensitivity);
        let expected_range = ExpectedRange {
            lower: stats.mean - threshold,
            upper: stats.mean + threshold,
        };

        samples
            .iter()
            .filter_map(|sample| {
                let deviation = (sample.value - stats.mean).abs();
                (deviation > threshold).then(|| Candidate {
                    timestamp: sample.timestamp,
                    value: sample.value,
                    deviation,
                    scale: stats.std_dev,
                    expected_range,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricId;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: &[f64]) -> Vec<MetricSample> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| MetricSample::new(MetricId(1), start + Duration::days(i as i64), *v))
            .collect()
    }

    fn s(value: f64) -> Sensitivity {
        Sensitivity::new(value).unwrap()
    }

    #[test]
    fn test_sigma_multiple_range() {
        assert_eq!(StatisticalDetector::sigma_multiple(s(0.0)), 3.0);
        assert_eq!(StatisticalDetector::sigma_multiple(s(1.0)), 1.0);
        assert!((StatisticalDetector::sigma_multiple(s(0.8)) - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_flags_single_outlier() {
        let samples = series(&[
            50.0, 52.0, 48.0, 51.0, 49.0, 50.0, 52.0, 48.0, 51.0, 49.0, 90.0, 50.0, 48.0, 52.0,
        ]);
        let found = StatisticalDetector::new().detect(&samples, s(0.8));

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, 90.0);
        assert_eq!(found[0].timestamp, samples[10].timestamp);
        assert!(found[0].expected_range.upper < 90.0);
        assert!(found[0].deviation / found[0].scale > 3.0);
    }

    #[test]
    fn test_flat_series_has_no_anomalies() {
        let samples = series(&[0.1; 12]);
        for sensitivity in [0.0, 0.5, 1.0] {
            assert!(StatisticalDetector::new()
                .detect(&samples, s(sensitivity))
                .is_empty());
        }
    }

    #[test]
    fn test_normal_variation_not_flagged_at_low_sensitivity() {
        let samples = series(&[10.0, 11.0, 9.0, 10.5, 9.5, 10.2, 9.8]);
        assert!(StatisticalDetector::new().detect(&samples, s(0.0)).is_empty());
    }
}
