//! Window statistics shared by the detectors

use crate::models::MetricSample;

/// Mean and spread of a sample window
///
/// Mean is the population mean; `std_dev` applies Bessel's correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl WindowStats {
    /// Compute stats over the values of `samples`, `None` when empty
    pub fn from_samples(samples: &[MetricSample]) -> Option<Self> {
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        Self::from_values(&values)
    }

    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;

        // Two-pass variance for numerical stability
        let std_dev = if count > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Some(Self {
            mean,
            std_dev,
            count,
        })
    }

    /// True when the window has no measurable spread
    pub fn is_flat(&self) -> bool {
        self.std_dev < f64::EPSILON
    }
}

/// First and third quartile of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    pub q1: f64,
    pub q3: f64,
}

impl Quartiles {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Some(Self {
            q1: percentile_sorted(&sorted, 0.25),
            q3: percentile_sorted(&sorted, 0.75),
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

/// Percentile by linear interpolation between closest ranks
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
