//! HTTP API: health checks, Prometheus metrics and the detection endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{
    analysis::AnomalyAnalyzer,
    anomaly::{AlertDispatcher, AnomalyDetectionEngine},
    health::{ComponentStatus, HealthRegistry},
    ingest::SampleIngestor,
    models::{Algorithm, DeviceId, MetricId, MetricSample, MonitoredMetric},
    observability::{SentinelMetrics, StructuredLogger},
    orchestrator::{DetectionOrchestrator, DetectionScope},
    store::{AlertSink, InMemoryAlertSink, InMemoryCatalog, InMemorySampleStore},
    SentinelError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AgentConfig;

/// Default period for alert listings and summaries
const DEFAULT_ALERT_PERIOD_DAYS: i64 = 7;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: SentinelMetrics,
    pub catalog: Arc<InMemoryCatalog>,
    pub store: Arc<InMemorySampleStore>,
    pub sink: Arc<InMemoryAlertSink>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub ingestor: Arc<SampleIngestor>,
    pub orchestrator: Arc<DetectionOrchestrator>,
    pub analyzer: Arc<AnomalyAnalyzer>,
}

impl AppState {
    /// Wire the pipeline over in-memory collaborators
    pub fn in_memory(config: &AgentConfig, health_registry: HealthRegistry) -> Self {
        let logger = StructuredLogger::new(config.node_name.clone());
        let catalog = Arc::new(InMemoryCatalog::new());
        let store = Arc::new(
            InMemorySampleStore::new()
                .with_retention(Duration::days(config.detection.lookback_days + 5)),
        );
        let sink = Arc::new(InMemoryAlertSink::new());

        let dispatcher = Arc::new(AlertDispatcher::with_config(
            catalog.clone(),
            sink.clone(),
            config.dispatcher_config(),
        ));
        let ingestor = Arc::new(SampleIngestor::new(
            catalog.clone(),
            store.clone(),
            sink.clone(),
            logger.clone(),
        ));
        let orchestrator = Arc::new(DetectionOrchestrator::new(
            catalog.clone(),
            store.clone(),
            Arc::new(AnomalyDetectionEngine::new()),
            dispatcher.clone(),
            config.orchestrator_config(),
            logger,
        ));
        let analyzer = Arc::new(AnomalyAnalyzer::new(sink.clone()));

        Self {
            health_registry,
            metrics: SentinelMetrics::new(),
            catalog,
            store,
            sink,
            dispatcher,
            ingestor,
            orchestrator,
            analyzer,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error returned by handlers
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<SentinelError> for ApiError {
    fn from(err: SentinelError) -> Self {
        let status = match &err {
            SentinelError::MetricNotFound(_) => StatusCode::NOT_FOUND,
            SentinelError::InvalidSensitivity(_)
            | SentinelError::UnknownAlgorithm(_)
            | SentinelError::InvalidRequest(_)
            | SentinelError::InvalidSample(_) => StatusCode::BAD_REQUEST,
            SentinelError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            SentinelError::LeaseConflict(_) => StatusCode::CONFLICT,
            SentinelError::Store(_)
            | SentinelError::Catalog(_)
            | SentinelError::AlertSink(_)
            | SentinelError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Register or replace a monitored metric
async fn upsert_metric(
    State(state): State<Arc<AppState>>,
    Json(metric): Json<MonitoredMetric>,
) -> impl IntoResponse {
    info!(metric_id = %metric.id, device_id = %metric.device_id, "Registering metric");
    state.catalog.upsert(metric.clone()).await;
    state
        .metrics
        .set_monitored_metrics(state.catalog.len().await as i64);
    (StatusCode::CREATED, Json(metric))
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub samples: Vec<MetricSample>,
}

/// Ingest a batch of samples; 422 when nothing was accepted
async fn ingest_samples(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> impl IntoResponse {
    let submitted = request.samples.len();
    let summary = state.ingestor.ingest_batch(request.samples).await;

    let status = if submitted > 0 && summary.accepted == 0 {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    (status, Json(summary))
}

fn default_sensitivity() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    #[serde(default)]
    pub metric_id: Option<MetricId>,
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    pub algorithm: String,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
}

/// Run detection over the requested scope
async fn detect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DetectRequest>,
) -> Result<Response, ApiError> {
    let algorithm: Algorithm = request.algorithm.parse()?;
    let scope = DetectionScope::from_filters(request.metric_id, request.device_id);

    let report = state
        .orchestrator
        .run(scope, algorithm, request.sensitivity)
        .await?;

    Ok((StatusCode::OK, Json(report)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub device_id: Option<DeviceId>,
}

impl PeriodQuery {
    fn resolve(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
        let end = self.end.unwrap_or_else(Utc::now);
        let start = self
            .start
            .unwrap_or_else(|| end - Duration::days(DEFAULT_ALERT_PERIOD_DAYS));
        if start > end {
            return Err(ApiError::bad_request("start must not be after end"));
        }
        Ok((start, end))
    }
}

/// Anomaly alerts in a period, newest first
async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response, ApiError> {
    let (start, end) = query.resolve()?;
    let alerts = state
        .sink
        .query_anomaly_alerts(start, end, query.device_id)
        .await?;
    Ok(Json(alerts).into_response())
}

/// Grouped anomaly summary for a period
async fn alert_analysis(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response, ApiError> {
    let (start, end) = query.resolve()?;
    let summary = state.analyzer.summarize(start, end, query.device_id).await?;
    Ok(Json(summary).into_response())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/metrics", post(upsert_metric))
        .route("/api/v1/samples", post(ingest_samples))
        .route("/api/v1/detect", post(detect))
        .route("/api/v1/alerts", get(list_alerts))
        .route("/api/v1/alerts/analysis", get(alert_analysis))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
