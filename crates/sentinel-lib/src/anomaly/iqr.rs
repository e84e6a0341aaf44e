//! Interquartile-range outlier detector
//!
//! Fences sit at `Q1 − f·IQR` and `Q3 + f·IQR` where the factor widens from
//! 1.5 at sensitivity 1 to 3.0 at sensitivity 0. Quartiles are robust to the
//! outliers being hunted, so this detector needs a larger window.

use super::{Candidate, Detector, Quartiles, MIN_SAMPLES_IQR};
use crate::models::{Algorithm, ExpectedRange, MetricSample, Sensitivity};

/// Detects samples outside the Tukey fences
#[derive(Debug, Clone, Default)]
pub struct IqrDetector;

impl IqrDetector {
    pub fn new() -> Self {
        Self
    }

    /// IQR multiplier at `sensitivity`
    pub fn fence_factor(sensitivity: Sensitivity) -> f64 {
        1.5 + (1.0 - sensitivity.value()) * 1.5
    }

    /// Lower and upper fence for the given quartiles
    pub fn fences(quartiles: Quartiles, sensitivity: Sensitivity) -> ExpectedRange {
        let factor = Self::fence_factor(sensitivity);
        let iqr = quartiles.iqr();
        ExpectedRange {
            lower: quartiles.q1 - factor * iqr,
            upper: quartiles.q3 + factor * iqr,
        }
    }
}

impl Detector for IqrDetector {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Iqr
    }

    fn min_samples(&self) -> usize {
        MIN_SAMPLES_IQR
    }

    fn detect(&self, samples: &[MetricSample], sensitivity: Sensitivity) -> Vec<Candidate> {
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let Some(quartiles) = Quartiles::from_values(&values) else {
            return Vec::new();
        };

        // Severity is measured in IQR units, so a zero IQR gives no scale
        let iqr = quartiles.iqr();
        if iqr < f64::EPSILON {
            return Vec::new();
        }

        let fences = Self::fences(quartiles, sensitivity);

        samples
            .iter()
            .filter_map(|sample| {
                let deviation = if sample.value < fences.lower {
                    fences.lower - sample.value
                } else if sample.value > fences.upper {
                    sample.value - fences.upper
                } else {
                    return None;
                };

                Some(Candidate {
                    timestamp: sample.timestamp,
                    value: sample.value,
                    deviation,
                    scale: iqr,
                    expected_range: fences,
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
            .map(|(i, v)| MetricSample::new(MetricId(1), start + Duration::minutes(i as i64), *v))
            .collect()
    }

    fn s(value: f64) -> Sensitivity {
        Sensitivity::new(value).unwrap()
    }

    #[test]
    fn test_fence_factor_range() {
        assert_eq!(IqrDetector::fence_factor(s(1.0)), 1.5);
        assert_eq!(IqrDetector::fence_factor(s(0.0)), 3.0);
    }

    #[test]
    fn test_fences_for_known_quartiles() {
        let fences = IqrDetector::fences(Quartiles { q1: 10.0, q3: 20.0 }, s(1.0));
        assert_eq!(fences.lower, -5.0);
        assert_eq!(fences.upper, 35.0);
        assert!(36.0 > fences.upper);
        assert!(34.0 <= fences.upper);
    }

    #[test]
    fn test_value_above_upper_fence_is_flagged() {
        // Q1 = 10, Q3 = 20 with 13 samples
        let base = [10.0, 10.0, 10.0, 10.0, 12.0, 14.0, 15.0, 16.0, 18.0, 20.0, 20.0, 20.0];

        let mut flagged = base.to_vec();
        flagged.push(36.0);
        let found = IqrDetector::new().detect(&series(&flagged), s(1.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, 36.0);
        assert!((found[0].deviation - 1.0).abs() < 1e-9);
        assert_eq!(found[0].scale, 10.0);

        let mut quiet = base.to_vec();
        quiet.push(34.0);
        assert!(IqrDetector::new().detect(&series(&quiet), s(1.0)).is_empty());
    }

    #[test]
    fn test_lower_fence_deviation() {
        let mut values = vec![
            10.0, 10.0, 10.0, 10.0, 12.0, 14.0, 15.0, 16.0, 18.0, 20.0, 20.0, 20.0,
        ];
        values.push(-8.0);
        // Quartiles shift: sorted [-8,10,10,10,10,12,14,15,16,18,20,20,20], q1=10, q3=18
        let found = IqrDetector::new().detect(&series(&values), s(1.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, -8.0);
        // Lower fence is 10 - 1.5 * 8 = -2
        assert!((found[0].deviation - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_iqr_produces_nothing() {
        let found = IqrDetector::new().detect(&series(&[5.0; 15]), s(1.0));
        assert!(found.is_empty());
    }
}
