//! Sentinel Agent - metric anomaly detection service
//!
//! Serves the ingestion and detection API and runs scheduled global
//! detection passes.

use anyhow::Result;
use sentinel_agent::{api, config, scheduler::DetectionTrigger};
use sentinel_lib::{health::HealthRegistry, observability::StructuredLogger};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sentinel-agent");

    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        api_port = config.api_port,
        max_concurrency = config.detection.max_concurrency,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let logger = StructuredLogger::new(config.node_name.clone());
    logger.log_startup(AGENT_VERSION);

    let app_state = Arc::new(api::AppState::in_memory(&config, health_registry.clone()));
    health_registry
        .probe(
            app_state.catalog.as_ref(),
            app_state.store.as_ref(),
            app_state.sink.as_ref(),
        )
        .await;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler_handle = if config.schedule.enabled {
        let trigger = Arc::new(DetectionTrigger::new(
            app_state.orchestrator.clone(),
            app_state.dispatcher.clone(),
            health_registry.clone(),
            config.schedule.clone(),
        ));
        Some(tokio::spawn(trigger.run(shutdown_tx.subscribe())))
    } else {
        info!("Scheduled detection disabled");
        None
    };

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }

    info!("Shutdown complete");
    Ok(())
}
