//! Core data models for the detection pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SentinelError;

/// Identifier of a monitored metric (a metric definition bound to a device)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(pub u64);

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a network device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static description of what a metric measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: u64,
    pub name: String,
    pub unit: String,
    /// How the value is collected (snmp, agent, icmp, ...)
    #[serde(default)]
    pub collection_method: String,
}

/// Static limits checked on every ingested sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLimits {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub warning_min: Option<f64>,
    #[serde(default)]
    pub warning_max: Option<f64>,
}

/// A metric definition bound to a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredMetric {
    pub id: MetricId,
    pub device_id: DeviceId,
    pub definition: MetricDefinition,
    pub active: bool,
    pub collection_interval_secs: u64,
    #[serde(default)]
    pub thresholds: ThresholdLimits,
    #[serde(default)]
    pub last_value: Option<f64>,
    #[serde(default)]
    pub last_collected_at: Option<DateTime<Utc>>,
}

impl MonitoredMetric {
    /// Human readable label used in alert titles
    pub fn display_name(&self) -> String {
        if self.definition.unit.is_empty() {
            self.definition.name.clone()
        } else {
            format!("{} ({})", self.definition.name, self.definition.unit)
        }
    }
}

/// A single observation of a monitored metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_id: MetricId,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(metric_id: MetricId, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            metric_id,
            timestamp,
            value,
        }
    }
}

/// Detection algorithm identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Mean / standard deviation band
    #[serde(rename = "statistical")]
    Statistical,
    /// Absolute z-score against a sensitivity-derived cutoff
    #[serde(rename = "z_score")]
    ZScore,
    /// Interquartile-range fences. Scheduled jobs still submit this under the
    /// `isolation_forest` name.
    #[serde(rename = "isolation_forest", alias = "iqr")]
    Iqr,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Statistical, Algorithm::ZScore, Algorithm::Iqr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Statistical => "statistical",
            Algorithm::ZScore => "z_score",
            Algorithm::Iqr => "isolation_forest",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "statistical" => Ok(Algorithm::Statistical),
            "z_score" | "zscore" => Ok(Algorithm::ZScore),
            "isolation_forest" | "iqr" => Ok(Algorithm::Iqr),
            other => Err(SentinelError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Detection strictness in `[0, 1]`; 1.0 reports the most anomalies
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Sensitivity(f64);

impl Sensitivity {
    pub fn new(value: f64) -> Result<Self, SentinelError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SentinelError::InvalidSensitivity(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self(0.5)
    }
}

impl<'de> Deserialize<'de> for Sensitivity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Sensitivity::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Severity tier shared by anomaly and threshold alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive band a sample was expected to fall in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub lower: f64,
    pub upper: f64,
}

/// A sample flagged by a detector
///
/// Not persisted; lives only until the dispatcher turns it into an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric_id: MetricId,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub algorithm: Algorithm,
    pub sensitivity: f64,
    /// Algorithm-specific distance: std-dev distance, z-score or IQR distance
    pub deviation: f64,
    /// Unit the deviation is measured against (sigma, 1 for z-scores, IQR)
    pub scale: f64,
    pub severity: Severity,
    pub expected_range: ExpectedRange,
}

/// Where an alert originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    AnomalyDetection,
    Threshold,
}

/// Alert lifecycle state; transitions are owned by alert management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Acknowledged,
    Resolved,
}

/// A static limit crossed by an ingested sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub bound: crate::threshold::Bound,
    pub limit: f64,
}

/// Payload carried by an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertDetail {
    Anomaly(Anomaly),
    Threshold(ThresholdBreach),
}

/// Alert record handed to the alert sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub source: AlertSource,
    pub metric_id: MetricId,
    pub device_id: DeviceId,
    pub detail: AlertDetail,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// The anomaly behind this alert, if it came from detection
    pub fn anomaly(&self) -> Option<&Anomaly> {
        match &self.detail {
            AlertDetail::Anomaly(anomaly) => Some(anomaly),
            AlertDetail::Threshold(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_wire_names() {
        assert_eq!("statistical".parse::<Algorithm>().unwrap(), Algorithm::Statistical);
        assert_eq!("z_score".parse::<Algorithm>().unwrap(), Algorithm::ZScore);
        assert_eq!("isolation_forest".parse::<Algorithm>().unwrap(), Algorithm::Iqr);
        assert_eq!("IQR".parse::<Algorithm>().unwrap(), Algorithm::Iqr);
        assert!("prophet".parse::<Algorithm>().is_err());

        let json = serde_json::to_string(&Algorithm::Iqr).unwrap();
        assert_eq!(json, "\"isolation_forest\"");
        let parsed: Algorithm = serde_json::from_str("\"iqr\"").unwrap();
        assert_eq!(parsed, Algorithm::Iqr);
    }

    #[test]
    fn test_sensitivity_bounds() {
        assert!(Sensitivity::new(0.0).is_ok());
        assert!(Sensitivity::new(1.0).is_ok());
        assert!(Sensitivity::new(1.01).is_err());
        assert!(Sensitivity::new(-0.1).is_err());
        assert!(Sensitivity::new(f64::NAN).is_err());

        let rejected = serde_json::from_str::<Sensitivity>("1.5");
        assert!(rejected.is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
    }
}
