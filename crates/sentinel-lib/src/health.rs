//! Health tracking for the agent's collaborators
//!
//! Components report their own status; [`HealthRegistry::probe`] can also
//! poke the catalog, sample store and alert sink directly. The registry backs
//! the agent's liveness and readiness endpoints.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::MetricId;
use crate::store::{AlertSink, MetricCatalog, MetricSampleStore};

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but with failures worth looking at
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Latest health report for one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components; healthy when there are none
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|health| health.status)
            .max_by_key(|status| match status {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const CATALOG: &str = "catalog";
    pub const SAMPLE_STORE: &str = "sample_store";
    pub const ALERT_SINK: &str = "alert_sink";
    pub const SCHEDULER: &str = "scheduler";

    pub const ALL: [&str; 4] = [CATALOG, SAMPLE_STORE, ALERT_SINK, SCHEDULER];
}

#[derive(Debug, Default)]
struct HealthState {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared registry of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Register every pipeline component
    pub async fn register_all(&self) {
        for name in components::ALL {
            self.register(name).await;
        }
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut state = self.state.write().await;
        state.components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    /// Check the collaborators with cheap reads and record the results
    pub async fn probe(
        &self,
        catalog: &dyn MetricCatalog,
        store: &dyn MetricSampleStore,
        sink: &dyn AlertSink,
    ) {
        let now = Utc::now();

        let catalog_health = match catalog.get_by_id(MetricId(0)).await {
            Ok(_) => ComponentHealth::healthy(),
            Err(e) => ComponentHealth::unhealthy(e.to_string()),
        };
        let store_health = match store.query(MetricId(0), now, now).await {
            Ok(_) => ComponentHealth::healthy(),
            Err(e) => ComponentHealth::unhealthy(e.to_string()),
        };
        let sink_health = match sink.query_anomaly_alerts(now, now, None).await {
            Ok(_) => ComponentHealth::healthy(),
            Err(e) => ComponentHealth::unhealthy(e.to_string()),
        };

        let mut state = self.state.write().await;
        state
            .components
            .insert(components::CATALOG.to_string(), catalog_health);
        state
            .components
            .insert(components::SAMPLE_STORE.to_string(), store_health);
        state
            .components
            .insert(components::ALERT_SINK.to_string(), sink_health);
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.state.read().await.components.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once initialized and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        if !state.ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("Agent not yet initialized".to_string()),
            };
        }

        let mut unhealthy: Vec<&str> = state
            .components
            .iter()
            .filter(|(_, health)| !health.status.is_operational())
            .map(|(name, _)| name.as_str())
            .collect();

        if unhealthy.is_empty() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            unhealthy.sort_unstable();
            ReadinessResponse {
                ready: false,
                reason: Some(format!("Unhealthy components: {}", unhealthy.join(", "))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SentinelError};
    use crate::models::MetricSample;
    use crate::store::{async_trait, InMemoryAlertSink, InMemoryCatalog, InMemorySampleStore};
    use chrono::DateTime;

    struct DownStore;

    #[async_trait]
    impl MetricSampleStore for DownStore {
        async fn query(
            &self,
            _metric_id: MetricId,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<MetricSample>> {
            Err(SentinelError::Store("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_register_all_components() {
        let registry = HealthRegistry::new();
        registry.register_all().await;

        let health = registry.health().await;
        for name in components::ALL {
            assert_eq!(health.components[name].status, ComponentStatus::Healthy);
        }
    }

    #[tokio::test]
    async fn test_degraded_scheduler_keeps_agent_ready() {
        let registry = HealthRegistry::new();
        registry.register_all().await;
        registry.set_ready(true).await;

        registry
            .set_degraded(components::SCHEDULER, "2 metrics failed in last run")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.register_all().await;
        registry.set_ready(true).await;
        registry
            .set_unhealthy(components::ALERT_SINK, "database locked")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Unhealthy components: alert_sink")
        );
    }

    #[tokio::test]
    async fn test_registry_check_records_collaborator_status() {
        let registry = HealthRegistry::new();
        let catalog = InMemoryCatalog::new();
        let sink = InMemoryAlertSink::new();

        registry
            .probe(&catalog, &InMemorySampleStore::new(), &sink)
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        registry.probe(&catalog, &DownStore, &sink).await;
        let health = registry.health().await;
        assert_eq!(
            health.components[components::SAMPLE_STORE].status,
            ComponentStatus::Unhealthy
        );
        assert_eq!(
            health.components[components::CATALOG].status,
            ComponentStatus::Healthy
        );
    }
}
