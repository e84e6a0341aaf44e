//! Metric anomaly detection and alerting
//!
//! This crate provides:
//! - Sample ingestion with static threshold checks
//! - Statistical, z-score and IQR anomaly detection
//! - Severity classification and deduplicated alert dispatch
//! - Scoped detection runs with per-metric isolation
//! - Health checks and observability

pub mod analysis;
pub mod anomaly;
pub mod error;
pub mod health;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod store;
pub mod threshold;

pub use analysis::{AnomalyAnalyzer, AnomalySummary};
pub use error::{Result, SentinelError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use ingest::{IngestSummary, SampleIngestor};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
pub use orchestrator::{DetectionOrchestrator, DetectionReport, DetectionScope, OrchestratorConfig};
