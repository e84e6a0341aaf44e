//! Periodic detection trigger
//!
//! Runs a global detection pass on a fixed interval. A run that fails
//! outright (the catalog could not be read) is retried with exponential
//! backoff; per-metric failures inside a run only degrade the scheduler's
//! health.

use sentinel_lib::{
    anomaly::AlertDispatcher,
    health::{components, HealthRegistry},
    orchestrator::{DetectionOrchestrator, DetectionReport, DetectionScope},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::ScheduleSettings;

/// Upper bound on the delay between retries
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Triggers scheduled global detection runs
pub struct DetectionTrigger {
    orchestrator: Arc<DetectionOrchestrator>,
    dispatcher: Arc<AlertDispatcher>,
    health: HealthRegistry,
    settings: ScheduleSettings,
}

impl DetectionTrigger {
    pub fn new(
        orchestrator: Arc<DetectionOrchestrator>,
        dispatcher: Arc<AlertDispatcher>,
        health: HealthRegistry,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            orchestrator,
            dispatcher,
            health,
            settings,
        }
    }

    /// Run until `shutdown` fires
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.settings.interval_secs,
            algorithm = %self.settings.algorithm,
            sensitivity = self.settings.sensitivity,
            "Starting detection scheduler"
        );

        let mut ticker = interval(Duration::from_secs(self.settings.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.trigger_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down detection scheduler");
                    break;
                }
            }
        }
    }

    /// One scheduled run with retries; `None` once retries are exhausted
    pub async fn trigger_once(&self) -> Option<DetectionReport> {
        let attempts = self.settings.max_retries + 1;
        let mut backoff = Duration::from_millis(self.settings.initial_backoff_ms);

        for attempt in 1..=attempts {
            match self
                .orchestrator
                .run(
                    DetectionScope::Global,
                    self.settings.algorithm,
                    self.settings.sensitivity,
                )
                .await
            {
                Ok(report) => {
                    self.record_outcome(&report).await;
                    self.dispatcher.cleanup_dedup_cache();
                    return Some(report);
                }
                Err(e) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Scheduled detection run failed"
                    );
                    self.health
                        .set_degraded(
                            components::SCHEDULER,
                            format!("run attempt {} of {} failed: {}", attempt, attempts, e),
                        )
                        .await;

                    if attempt < attempts {
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }

        warn!(attempts = attempts, "Giving up on scheduled detection run");
        None
    }

    async fn record_outcome(&self, report: &DetectionReport) {
        if report.error_count > 0 {
            self.health
                .set_degraded(
                    components::SCHEDULER,
                    format!(
                        "{} of {} metrics failed in last run",
                        report.error_count, report.metrics_analyzed
                    ),
                )
                .await;
        } else {
            self.health.set_healthy(components::SCHEDULER).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_lib::{
        anomaly::AnomalyDetectionEngine,
        health::ComponentStatus,
        models::{Algorithm, DeviceId, MetricId, MonitoredMetric},
        observability::StructuredLogger,
        orchestrator::OrchestratorConfig,
        store::{
            async_trait, InMemoryAlertSink, InMemoryCatalog, InMemorySampleStore, MetricCatalog,
        },
        Result, SentinelError,
    };
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` lookups of active metrics
    struct FlakyCatalog {
        inner: InMemoryCatalog,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetricCatalog for FlakyCatalog {
        async fn get_by_id(&self, metric_id: MetricId) -> Result<Option<MonitoredMetric>> {
            self.inner.get_by_id(metric_id).await
        }

        async fn get_by_device(&self, device_id: DeviceId) -> Result<Vec<MonitoredMetric>> {
            self.inner.get_by_device(device_id).await
        }

        async fn get_active(&self) -> Result<Vec<MonitoredMetric>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(SentinelError::Catalog("timeout".to_string()));
            }
            self.inner.get_active().await
        }

        async fn record_last_value(
            &self,
            metric_id: MetricId,
            value: f64,
            at: DateTime<Utc>,
        ) -> Result<()> {
            self.inner.record_last_value(metric_id, value, at).await
        }
    }

    fn trigger(
        failures: usize,
        max_retries: u32,
    ) -> (DetectionTrigger, Arc<FlakyCatalog>, HealthRegistry) {
        let catalog = Arc::new(FlakyCatalog {
            inner: InMemoryCatalog::new(),
            failures,
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Arc::new(AlertDispatcher::new(
            catalog.clone(),
            Arc::new(InMemoryAlertSink::new()),
        ));
        let orchestrator = Arc::new(DetectionOrchestrator::new(
            catalog.clone(),
            Arc::new(InMemorySampleStore::new()),
            Arc::new(AnomalyDetectionEngine::new()),
            dispatcher.clone(),
            OrchestratorConfig::default(),
            StructuredLogger::new("test-node"),
        ));
        let health = HealthRegistry::new();
        let settings = ScheduleSettings {
            algorithm: Algorithm::ZScore,
            max_retries,
            initial_backoff_ms: 1,
            ..ScheduleSettings::default()
        };
        (
            DetectionTrigger::new(orchestrator, dispatcher, health.clone(), settings),
            catalog,
            health,
        )
    }

    #[tokio::test]
    async fn test_retries_until_catalog_recovers() {
        let (trigger, catalog, health) = trigger(2, 3);

        let report = trigger.trigger_once().await.unwrap();

        // Empty catalog resolves to an unsuccessful, error-free report
        assert!(!report.success);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 3);
        let status = health.health().await.components[components::SCHEDULER].status;
        assert_eq!(status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (trigger, catalog, health) = trigger(10, 2);

        assert!(trigger.trigger_once().await.is_none());
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 3);
        let status = health.health().await.components[components::SCHEDULER].status;
        assert_eq!(status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (trigger, _catalog, _health) = trigger(0, 0);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(Arc::new(trigger).run(rx));
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
