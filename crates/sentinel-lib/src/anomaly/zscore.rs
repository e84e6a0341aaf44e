//! Z-score detector

use super::{Candidate, Detector, WindowStats, MIN_SAMPLES_STATISTICAL};
use crate::models::{Algorithm, ExpectedRange, MetricSample, Sensitivity};

/// Flags samples whose absolute z-score exceeds `3 − 1.5s`
#[derive(Debug, Clone, Default)]
pub struct ZScoreDetector;

impl ZScoreDetector {
    pub fn new() -> Self {
        Self
    }

    /// Z-score cutoff at `sensitivity` (3.0 down to 1.5)
    pub fn cutoff(sensitivity: Sensitivity) -> f64 {
        3.0 - sensitivity.value() * 1.5
    }
}

impl Detector for ZScoreDetector {
    fn algorithm(&self) -> Algorithm {
        Algorithm::ZScore
    }

    fn min_samples(&self) -> usize {
        MIN_SAMPLES_STATISTICAL
    }

    fn detect(&self, samples: &[MetricSample], sensitivity: Sensitivity) -> Vec<Candidate> {
        let Some(stats) = WindowStats::from_samples(samples) else {
            return Vec::new();
        };

        // Every z-score is 0 when σ is 0
        if stats.is_flat() {
            return Vec::new();
        }

        let cutoff = Self::cutoff(sensitivity);
        let expected_range = ExpectedRange {
            lower: stats.mean - cutoff * stats.std_dev,
            upper: stats.mean + cutoff * stats.std_dev,
        };

        samples
            .iter()
            .filter_map(|sample| {
                let z_score = (sample.value - stats.mean).abs() / stats.std_dev;
                (z_score > cutoff).then(|| Candidate {
                    timestamp: sample.timestamp,
                    value: sample.value,
                    deviation: z_score,
                    scale: 1.0,
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
            .map(|(i, v)| MetricSample::new(MetricId(1), start + Duration::hours(i as i64), *v))
            .collect()
    }

    #[test]
    fn test_cutoff_range() {
        assert_eq!(ZScoreDetector::cutoff(Sensitivity::new(0.0).unwrap()), 3.0);
        assert_eq!(ZScoreDetector::cutoff(Sensitivity::new(1.0).unwrap()), 1.5);
    }

    #[test]
    fn test_reports_z_score_as_deviation() {
        let samples = series(&[
            50.0, 52.0, 48.0, 51.0, 49.0, 50.0, 52.0, 48.0, 51.0, 49.0, 90.0, 50.0, 48.0, 52.0,
        ]);
        let found = ZScoreDetector::new().detect(&samples, Sensitivity::new(0.0).unwrap());

        assert_eq!(found.len(), 1);
        assert!(found[0].deviation > 3.0 && found[0].deviation < 3.5);
        assert_eq!(found[0].scale, 1.0);
    }

    #[test]
    fn test_zero_variance_produces_nothing() {
        let samples = series(&[7.0, 7.0, 7.0, 7.0]);
        let found = ZScoreDetector::new().detect(&samples, Sensitivity::new(1.0).unwrap());
        assert!(found.is_empty());
    }
}
