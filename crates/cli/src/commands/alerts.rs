//! Alert listing and anomaly analysis commands

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{Alert, AnomalySummary, ApiClient};
use crate::output::{
    color_severity, format_timestamp, period_start, print_info, print_json, print_table,
    OutputFormat,
};

#[derive(Tabled, Serialize)]
struct AlertRow {
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Device")]
    device_id: u64,
    #[tabled(rename = "Metric")]
    metric_id: u64,
    #[tabled(rename = "Title")]
    title: String,
}

impl From<&Alert> for AlertRow {
    fn from(alert: &Alert) -> Self {
        Self {
            created_at: format_timestamp(&alert.created_at),
            severity: color_severity(&alert.severity),
            source: alert.source.clone(),
            device_id: alert.device_id,
            metric_id: alert.metric_id,
            title: alert.title.clone(),
        }
    }
}

#[derive(Tabled, Serialize)]
struct CountRow {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Anomalies")]
    count: usize,
}

#[derive(Tabled, Serialize)]
struct MetricCountRow {
    #[tabled(rename = "Metric")]
    metric_id: u64,
    #[tabled(rename = "Device")]
    device_id: u64,
    #[tabled(rename = "Anomalies")]
    count: usize,
}

fn period_query(since: &str, device_id: Option<u64>) -> Result<Vec<(&'static str, String)>> {
    let mut query = vec![("start", period_start(since)?.to_rfc3339())];
    if let Some(device_id) = device_id {
        query.push(("device_id", device_id.to_string()));
    }
    Ok(query)
}

/// List anomaly alerts raised in the period
pub async fn list_alerts(
    client: &ApiClient,
    device_id: Option<u64>,
    since: &str,
    format: OutputFormat,
) -> Result<()> {
    let query = period_query(since, device_id)?;
    let alerts: Vec<Alert> = client.get_with_query("api/v1/alerts", &query).await?;

    match format {
        OutputFormat::Json => print_json(&alerts),
        OutputFormat::Table => {
            let rows: Vec<AlertRow> = alerts.iter().map(AlertRow::from).collect();
            print_table(&rows, format);
        }
    }

    Ok(())
}

/// Show grouped anomaly counts for the period
pub async fn show_analysis(
    client: &ApiClient,
    device_id: Option<u64>,
    since: &str,
    format: OutputFormat,
) -> Result<()> {
    let query = period_query(since, device_id)?;
    let summary: AnomalySummary = client
        .get_with_query("api/v1/alerts/analysis", &query)
        .await?;

    if format == OutputFormat::Json {
        print_json(&summary);
        return Ok(());
    }

    print_info(&format!(
        "{} anomalies between {} and {}",
        summary.total_anomalies,
        format_timestamp(&summary.period_start),
        format_timestamp(&summary.period_end)
    ));
    if summary.total_anomalies == 0 {
        return Ok(());
    }

    println!("\nBy severity:");
    let severity_rows: Vec<CountRow> = summary
        .by_severity
        .iter()
        .map(|(severity, count)| CountRow {
            group: color_severity(severity),
            count: *count,
        })
        .collect();
    print_table(&severity_rows, format);

    println!("\nBy algorithm:");
    let algorithm_rows: Vec<CountRow> = summary
        .by_algorithm
        .iter()
        .map(|(algorithm, count)| CountRow {
            group: algorithm.clone(),
            count: *count,
        })
        .collect();
    print_table(&algorithm_rows, format);

    if summary.device_id.is_none() {
        println!("\nBy device:");
        let device_rows: Vec<CountRow> = summary
            .by_device
            .iter()
            .map(|(device, count)| CountRow {
                group: device.clone(),
                count: *count,
            })
            .collect();
        print_table(&device_rows, format);
    }

    println!("\nTop metrics:");
    let metric_rows: Vec<MetricCountRow> = summary
        .by_metric
        .iter()
        .map(|m| MetricCountRow {
            metric_id: m.metric_id,
            device_id: m.device_id,
            count: m.count,
        })
        .collect();
    print_table(&metric_rows, format);

    if !summary.recent_alerts.is_empty() {
        println!("\nRecent alerts:");
        let rows: Vec<AlertRow> = summary.recent_alerts.iter().map(AlertRow::from).collect();
        print_table(&rows, format);
    }

    Ok(())
}
