//! Detection commands

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, DetectRequest, DetectionReport, MetricRunResult};
use crate::output::{
    color_status, print_error, print_info, print_json, print_success, print_table, print_warning,
    OutputFormat,
};

#[derive(Tabled, Serialize)]
struct MetricResultRow {
    #[tabled(rename = "Metric")]
    metric_id: u64,
    #[tabled(rename = "Device")]
    device_id: u64,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Samples")]
    samples: usize,
    #[tabled(rename = "Anomalies")]
    anomalies: usize,
    #[tabled(rename = "Alerts")]
    alerts: usize,
    #[tabled(rename = "Suppressed")]
    suppressed: usize,
    #[tabled(rename = "Time (ms)")]
    duration_ms: u64,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&MetricRunResult> for MetricResultRow {
    fn from(result: &MetricRunResult) -> Self {
        Self {
            metric_id: result.metric_id,
            device_id: result.device_id,
            status: color_status(&result.status),
            samples: result.samples_analyzed,
            anomalies: result.anomalies_found,
            alerts: result.alerts_created,
            suppressed: result.duplicates_suppressed,
            duration_ms: result.duration_ms,
            detail: result.detail.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Trigger a detection run and print its report
pub async fn run_detection(
    client: &ApiClient,
    metric_id: Option<u64>,
    device_id: Option<u64>,
    algorithm: String,
    sensitivity: f64,
    format: OutputFormat,
) -> Result<()> {
    let request = DetectRequest {
        metric_id,
        device_id,
        algorithm,
        sensitivity,
    };

    let report: DetectionReport = client.post("api/v1/detect", &request).await?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &DetectionReport) {
    if !report.success {
        print_warning(report.message.as_deref().unwrap_or("Detection run failed"));
    } else if let Some(message) = &report.message {
        print_info(message);
    }

    println!();
    println!("Algorithm:            {}", report.algorithm);
    println!("Sensitivity:          {:.2}", report.sensitivity);
    println!("Metrics analyzed:     {}", report.metrics_analyzed);
    if let Some(devices) = report.devices_processed {
        println!("Devices processed:    {}", devices);
    }
    println!("Anomalies found:      {}", report.anomalies_found);
    println!("Alerts created:       {}", report.alerts_created);
    println!("Duplicates suppressed: {}", report.duplicates_suppressed);
    println!("Duration:             {} ms", report.duration_ms);

    if let Some(results) = &report.metric_results {
        println!();
        let rows: Vec<MetricResultRow> = results.iter().map(MetricResultRow::from).collect();
        print_table(&rows, OutputFormat::Table);
    }

    if !report.skipped.is_empty() {
        println!();
        print_info(&format!(
            "{} metric(s) skipped, a run already holds them: {:?}",
            report.skipped.len(),
            report.skipped
        ));
    }

    if report.alert_failures > 0 {
        print_warning(&format!(
            "{} alert(s) could not be delivered",
            report.alert_failures
        ));
    }

    for failure in &report.errors {
        print_error(&format!(
            "metric {} (device {}): {}",
            failure.metric_id, failure.device_id, failure.error
        ));
    }

    if report.success && report.error_count == 0 {
        println!();
        print_success("Detection run completed");
    }
}
