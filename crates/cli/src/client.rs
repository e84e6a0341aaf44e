//! API client for communicating with the sentinel agent

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the sentinel agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Make a GET request with URL-encoded query parameters
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path, query)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Fetch a probe endpoint; its body is meaningful on 503 as well
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path, &[])?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return response.json().await.context("Failed to parse response");
        }

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path, &[])?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API request and response types

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<u64>,
    pub algorithm: String,
    pub sensitivity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricFailure {
    pub metric_id: u64,
    pub device_id: u64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRunResult {
    pub metric_id: u64,
    pub device_id: u64,
    pub status: String,
    pub samples_analyzed: usize,
    pub anomalies_found: usize,
    pub alerts_created: usize,
    pub duplicates_suppressed: usize,
    #[serde(default)]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub algorithm: String,
    pub sensitivity: f64,
    pub metrics_analyzed: usize,
    pub anomalies_found: usize,
    pub alerts_created: usize,
    pub duplicates_suppressed: usize,
    pub alert_failures: usize,
    pub errors: Vec<MetricFailure>,
    pub error_count: usize,
    #[serde(default)]
    pub skipped: Vec<u64>,
    #[serde(default)]
    pub devices_processed: Option<usize>,
    #[serde(default)]
    pub metric_results: Option<Vec<MetricRunResult>>,
    pub timestamp: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub description: String,
    pub severity: String,
    pub source: String,
    pub metric_id: u64,
    pub device_id: u64,
    pub status: String,
    pub created_at: String,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAnomalyCount {
    pub metric_id: u64,
    pub device_id: u64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub period_start: String,
    pub period_end: String,
    #[serde(default)]
    pub device_id: Option<u64>,
    pub total_anomalies: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_algorithm: BTreeMap<String, usize>,
    pub by_metric: Vec<MetricAnomalyCount>,
    pub by_device: BTreeMap<String, usize>,
    pub recent_alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default)]
    pub reason: Option<String>,
}
