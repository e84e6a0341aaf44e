//! Integration tests for the agent API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use sentinel_agent::{
    api::{create_router, AppState},
    config::AgentConfig,
};
use sentinel_lib::health::{components, HealthRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SPIKE_SERIES: [f64; 14] = [
    50.0, 52.0, 48.0, 51.0, 49.0, 50.0, 52.0, 48.0, 51.0, 49.0, 90.0, 50.0, 48.0, 52.0,
];

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let state = Arc::new(AppState::in_memory(&AgentConfig::default(), health_registry));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn metric_payload(id: u64, device_id: u64) -> Value {
    json!({
        "id": id,
        "device_id": device_id,
        "definition": { "id": 1, "name": "cpu_util", "unit": "%", "collection_method": "snmp" },
        "active": true,
        "collection_interval_secs": 3600,
        "thresholds": { "max": 95.0, "warning_max": 85.0 }
    })
}

fn spike_samples(metric_id: u64) -> Value {
    let now = Utc::now();
    let count = SPIKE_SERIES.len() as i64;
    let samples: Vec<Value> = SPIKE_SERIES
        .iter()
        .enumerate()
        .map(|(i, v)| {
            json!({
                "metric_id": metric_id,
                "timestamp": (now - Duration::hours(count - i as i64)).to_rfc3339(),
                "value": v,
            })
        })
        .collect();
    json!({ "samples": samples })
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get(&app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["components"]["scheduler"]["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::SCHEDULER, "1 of 4 metrics failed in last run")
        .await;

    // Degraded still returns 200 (operational)
    let (status, health) = get(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::ALERT_SINK, "database locked")
        .await;

    let (status, health) = get(&app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_reflects_initialization() {
    let (app, state) = setup_test_app().await;

    let (status, readiness) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, readiness) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_pipeline_metrics() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("sentinel_"));
}

#[tokio::test]
async fn test_ingest_detect_and_report_flow() {
    let (app, _state) = setup_test_app().await;

    let (status, _) = post(&app, "/api/v1/metrics", metric_payload(1, 7)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, summary) = post(&app, "/api/v1/samples", spike_samples(1)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["accepted"], 14);
    // 90 crosses the 85 warning limit
    assert_eq!(summary["threshold_violations"], 1);

    let (status, report) = post(
        &app,
        "/api/v1/detect",
        json!({ "metric_id": 1, "algorithm": "statistical", "sensitivity": 0.8 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["success"], true);
    assert_eq!(report["anomalies_found"], 1);
    assert_eq!(report["alerts_created"], 1);
    assert_eq!(report["scope"]["kind"], "metric");

    let (status, alerts) = get(&app, "/api/v1/alerts").await;
    assert_eq!(status, StatusCode::OK);
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity"], "critical");
    assert_eq!(alerts[0]["source"], "anomaly_detection");

    let (status, analysis) = get(&app, "/api/v1/alerts/analysis?device_id=7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["total_anomalies"], 1);
    assert_eq!(analysis["by_algorithm"]["statistical"], 1);

    // Same point again is suppressed
    let (_, report) = post(
        &app,
        "/api/v1/detect",
        json!({ "device_id": 7, "algorithm": "statistical", "sensitivity": 0.8 }),
    )
    .await;
    assert_eq!(report["alerts_created"], 0);
    assert_eq!(report["duplicates_suppressed"], 1);
    assert_eq!(report["devices_processed"], 1);
}

#[tokio::test]
async fn test_detect_rejects_unknown_algorithm() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = post(
        &app,
        "/api/v1/detect",
        json!({ "algorithm": "prophet", "sensitivity": 0.5 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("prophet"));
}

#[tokio::test]
async fn test_detect_with_no_metrics_is_unsuccessful() {
    let (app, _state) = setup_test_app().await;

    let (status, report) = post(
        &app,
        "/api/v1/detect",
        json!({ "algorithm": "z_score" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["success"], false);
    assert_eq!(report["sensitivity"], 0.5);
}

#[tokio::test]
async fn test_samples_for_unknown_metric_are_rejected() {
    let (app, _state) = setup_test_app().await;

    let (status, summary) = post(&app, "/api/v1/samples", spike_samples(42)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(summary["accepted"], 0);
    assert_eq!(summary["rejected"].as_array().unwrap().len(), 14);
}

#[tokio::test]
async fn test_inverted_alert_period_is_bad_request() {
    let (app, _state) = setup_test_app().await;

    let (status, _) = get(
        &app,
        "/api/v1/alerts?start=2024-02-01T00:00:00Z&end=2024-01-01T00:00:00Z",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
