//! HTTP tests for the real-time push and pull endpoints, driving the router
//! in-process against the field-map cache and a mocked persistence gateway.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::domain::{
    DeviceMetricSnapshot, MockPersistenceGateway, MockPersistenceSession, PersistenceGateway,
    PersistenceSession, RealtimeCache,
};
use common::realtime::FieldMapCache;
use realtime_api::domain::TrafficSituationService;
use realtime_api::http::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// Test Fixtures
// ============================================================================

/// Gateway knowing a single intersection `X1` with devices rsu-1 and rsu-2
fn create_test_gateway() -> Arc<dyn PersistenceGateway> {
    let mut gateway = MockPersistenceGateway::new();
    gateway.expect_session().returning(|| {
        let mut session = MockPersistenceSession::new();
        session
            .expect_intersection_exists()
            .returning(|code| Ok(code == "X1"));
        session
            .expect_list_devices_for_intersection()
            .returning(|_| Ok(vec!["rsu-1".to_string(), "rsu-2".to_string()]));
        Ok(Box::new(session) as Box<dyn PersistenceSession>)
    });
    Arc::new(gateway)
}

fn create_test_app() -> (Router, Arc<FieldMapCache>) {
    let cache = Arc::new(FieldMapCache::default());
    let service = Arc::new(TrafficSituationService::new(
        create_test_gateway(),
        cache.clone(),
    ));
    (create_router(Arc::new(AppState::new(service))), cache)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn post_json(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/realtime/route-info")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============================================================================
// Push
// ============================================================================

#[tokio::test]
async fn test_push_echoes_submitted_values() {
    let (app, cache) = create_test_app();
    cache
        .push(
            "rsu-1",
            &DeviceMetricSnapshot {
                pedestrian_total: Some(9),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (status, body) = send(
        app,
        post_json(json!({"deviceId": "rsu-1", "vehicleTotal": 5, "congestion": "slow"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({
            "deviceId": "rsu-1",
            "vehicleTotal": 5,
            "averageSpeed": null,
            "pedestrianTotal": null,
            "congestion": "slow"
        })
    );

    let snapshot = cache.pull("rsu-1").await.unwrap().unwrap();
    assert_eq!(snapshot.vehicle_total, Some(5));
    assert_eq!(snapshot.pedestrian_total, Some(9));
}

#[tokio::test(start_paused = true)]
async fn test_push_without_metrics_refreshes_expiry() {
    let (app, cache) = create_test_app();
    cache
        .push(
            "rsu-1",
            &DeviceMetricSnapshot {
                vehicle_total: Some(7),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(50)).await;
    let (status, body) = send(app, post_json(json!({"deviceId": "rsu-1"}))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["deviceId"], "rsu-1");
    assert!(body["vehicleTotal"].is_null());

    tokio::time::advance(Duration::from_secs(50)).await;
    let snapshot = cache.pull("rsu-1").await.unwrap().unwrap();
    assert_eq!(snapshot.vehicle_total, Some(7));
}

#[tokio::test]
async fn test_summary_saturates_large_counts() {
    let (app, _cache) = create_test_app();

    for device_id in ["rsu-1", "rsu-2"] {
        let (status, _) = send(
            app.clone(),
            post_json(json!({"deviceId": device_id, "vehicleTotal": u64::MAX})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(app, get("/api/v1/realtime/route-info?intersectionCode=X1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vehicleTotal"], json!(u64::MAX));
    assert_eq!(body["deviceCount"], 2);
}

#[tokio::test]
async fn test_push_rejects_empty_device_id() {
    let (app, _cache) = create_test_app();

    let (status, _) = send(app, post_json(json!({"deviceId": "", "vehicleTotal": 1}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_push_rejects_unknown_congestion_level() {
    let (app, _cache) = create_test_app();

    let (status, body) = send(
        app,
        post_json(json!({"deviceId": "rsu-1", "congestion": "gridlock"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// ============================================================================
// Pull
// ============================================================================

#[tokio::test]
async fn test_pull_summarizes_live_devices() {
    let (app, cache) = create_test_app();
    for (device, vehicles, speed, congestion) in [
        ("rsu-1", 4, 30.0, "congestion"),
        ("rsu-2", 6, 20.0, "free flow"),
    ] {
        let update: DeviceMetricSnapshot = serde_json::from_value(json!({
            "vehicleTotal": vehicles,
            "averageSpeed": speed,
            "congestion": congestion
        }))
        .unwrap();
        cache.push(device, &update).await.unwrap();
    }

    let (status, body) = send(app, get("/api/v1/realtime/route-info?intersectionCode=X1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "vehicleTotal": 10,
            "averageSpeed": 25,
            "pedestrianTotal": 0,
            "congestion": "congestion",
            "deviceCount": 2
        })
    );
}

#[tokio::test]
async fn test_pull_with_no_live_devices_is_zeroed() {
    let (app, _cache) = create_test_app();

    let (status, body) = send(app, get("/api/v1/realtime/route-info?intersectionCode=X1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vehicleTotal"], 0);
    assert_eq!(body["averageSpeed"], 0);
    assert_eq!(body["congestion"], "free flow");
    assert_eq!(body["deviceCount"], 0);
}

#[tokio::test]
async fn test_pull_unknown_intersection_is_not_found() {
    let (app, _cache) = create_test_app();

    let (status, body) = send(app, get("/api/v1/realtime/route-info?intersectionCode=NOPE")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("NOPE"));
}

#[tokio::test]
async fn test_pull_requires_intersection_code() {
    let (app, _cache) = create_test_app();

    let (status, _) = send(app, get("/api/v1/realtime/route-info")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_healthz() {
    let (app, _cache) = create_test_app();

    let response = app.oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
