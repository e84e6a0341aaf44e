//! Agent health command

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{
    color_status, print_json, print_success, print_table, print_warning, OutputFormat,
};

#[derive(Tabled, Serialize)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct AgentStatus {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

/// Show agent health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.probe("healthz").await?;
    let readiness: ReadinessResponse = client.probe("readyz").await?;

    if format == OutputFormat::Json {
        print_json(&AgentStatus { health, readiness });
        return Ok(());
    }

    println!("Agent status: {}", color_status(&health.status));
    if readiness.ready {
        print_success("Agent is ready");
    } else {
        print_warning(&format!(
            "Agent is not ready: {}",
            readiness.reason.as_deref().unwrap_or("initializing")
        ));
    }
    println!();

    let rows: Vec<ComponentRow> = health
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(&component.status),
            message: component.message.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    print_table(&rows, format);

    Ok(())
}
