//! Wire-level tests for the ingestion API
//!
//! Drive the router directly with raw HTTP requests so the tests cover the
//! same path a real client hits: body decoding, batch ceilings, per-envelope
//! validation, and the response counts.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use beacon_core::protocol::limits;
use beacon_server::{EventStore, IngestService};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

fn setup() -> (Router, Arc<IngestService>) {
    beacon_core::logging::init_test();
    let store = EventStore::open_in_memory().expect("open store");
    store.migrate().expect("migrate");
    let service = Arc::new(IngestService::new(Arc::new(store)));
    (beacon_server::http::router(service.clone()), service)
}

fn envelope(id: &str) -> serde_json::Value {
    serde_json::json!({
        "schema_version": 1,
        "event_id": id,
        "name": "app_opened",
        "client_ts": "2026-08-25T10:00:00Z",
        "anonymous_id": "anon-1",
        "session_id": "sess-1",
        "platform": "android",
        "app_name": "demo",
        "app_version": "1.0.0",
        "build": "42",
        "environment": "production",
    })
}

async fn post_events(app: &Router, body: String) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/events")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "BeaconSDK/1.0 (Android 14)")
        .body(Body::from(body))
        .expect("build request");

    let response = app.clone().oneshot(request).await.expect("send request");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("read body").to_bytes();
    let value = serde_json::from_slice(&bytes).expect("decode body");
    (status, value)
}

fn batch(events: Vec<serde_json::Value>) -> String {
    serde_json::json!({ "events": events }).to_string()
}

#[tokio::test]
async fn test_batch_accepted_and_counted() {
    let (app, service) = setup();

    let (status, body) = post_events(&app, batch(vec![envelope("evt-1"), envelope("evt-2")])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 2);
    assert_eq!(body["inserted"], 2);
    assert_eq!(body["duplicates"], 0);
    assert_eq!(body["dropped"], 0);

    assert_eq!(service.store().count().unwrap(), 2);
}

#[tokio::test]
async fn test_resubmitted_batch_reports_duplicates() {
    let (app, service) = setup();

    post_events(&app, batch(vec![envelope("evt-1")])).await;
    let (status, body) = post_events(&app, batch(vec![envelope("evt-1")])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 1);
    assert_eq!(body["inserted"], 0);
    assert_eq!(body["duplicates"], 1);
    assert_eq!(service.store().count().unwrap(), 1);
}

#[tokio::test]
async fn test_mixed_batch_counts_balance() {
    let (app, _service) = setup();

    let mut oversized = envelope("evt-big");
    oversized["properties"] =
        serde_json::json!({ "blob": "x".repeat(limits::MAX_PROPERTIES_BYTES + 1) });

    let (status, body) = post_events(
        &app,
        batch(vec![
            envelope("evt-1"),
            serde_json::json!({ "name": "missing everything else" }),
            oversized,
        ]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 3);
    assert_eq!(body["inserted"], 1);
    assert_eq!(body["dropped"], 2);
    let balanced = body["inserted"].as_u64().unwrap()
        + body["duplicates"].as_u64().unwrap()
        + body["dropped"].as_u64().unwrap();
    assert_eq!(body["received"].as_u64().unwrap(), balanced);
}

#[tokio::test]
async fn test_pii_scrubbed_even_when_client_bypasses_sdk() {
    let (app, service) = setup();

    let mut event = envelope("evt-1");
    event["properties"] = serde_json::json!({
        "Email": "a@b.com",
        "plan": "pro",
        "nested": { "phone_number": "555-0100" },
    });

    let (status, _) = post_events(&app, batch(vec![event])).await;
    assert_eq!(status, StatusCode::OK);

    let stored = service.store().recent(1).unwrap().remove(0);
    assert!(!stored.properties.contains_key("Email"));
    assert!(!stored.properties["nested"]
        .as_object()
        .unwrap()
        .contains_key("phone_number"));
    assert_eq!(stored.properties["plan"], "pro");
}

#[tokio::test]
async fn test_server_enrichment_at_rest() {
    let (app, service) = setup();

    let mut event = envelope("evt-1");
    event["ip_hash"] = serde_json::json!("spoofed-by-client");

    post_events(&app, batch(vec![event])).await;

    let stored = service.store().recent(1).unwrap().remove(0);
    assert!(stored.received_at.is_some());
    // No connection info in a direct router call, so no hash at all
    assert!(stored.ip_hash.is_none());
    assert_eq!(stored.client_summary.as_deref(), Some("beaconsdk"));
}

#[tokio::test]
async fn test_too_many_events_rejected() {
    let (app, service) = setup();

    let events: Vec<_> = (0..limits::MAX_BATCH_EVENTS + 1)
        .map(|i| envelope(&format!("evt-{i}")))
        .collect();

    let (status, body) = post_events(&app, batch(events)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "too many events in batch");
    assert_eq!(service.store().count().unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_payload_rejected() {
    let (app, service) = setup();

    let mut padded = envelope("evt-1");
    padded["properties"] = serde_json::json!({ "pad": "x".repeat(limits::MAX_PAYLOAD_BYTES) });

    let (status, body) = post_events(&app, batch(vec![padded])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "payload too large");
    assert_eq!(service.store().count().unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_body_rejected_before_decoding() {
    let (app, _service) = setup();

    // Over the ceiling and not JSON: the size verdict must win
    let raw = "x".repeat(limits::MAX_PAYLOAD_BYTES + 1);
    let (status, body) = post_events(&app, raw).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "payload too large");
}

#[tokio::test]
async fn test_unparseable_body_rejected() {
    let (app, _service) = setup();

    let (status, body) = post_events(&app, "{ not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid JSON body");
}

#[tokio::test]
async fn test_healthz() {
    let (app, _service) = setup();

    let request = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("send request");
    assert_eq!(response.status(), StatusCode::OK);
}
