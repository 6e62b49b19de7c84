//! HTTP surface
//!
//! Two routes: `POST /v1/events` for batch ingestion and `GET /healthz`
//! for liveness. The body is read raw so the payload ceiling applies before
//! JSON decoding, and store work runs on the blocking pool to keep SQLite
//! off the async workers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use beacon_core::protocol::IngestRequest;
use serde_json::json;

use crate::ingest::{IngestService, RequestMeta};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestService>,
}

/// Build the application router
pub fn router(service: Arc<IngestService>) -> Router {
    Router::new()
        .route("/v1/events", post(ingest_events))
        .route("/healthz", get(healthz))
        .with_state(AppState { service })
}

/// POST /v1/events
async fn ingest_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Response {
    if let Err(rejection) = state.service.check_payload(body.len()) {
        tracing::debug!(bytes = body.len(), "Rejecting oversized payload");
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, rejection.message());
    }

    let request: IngestRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting unparseable batch");
            return error_response(StatusCode::BAD_REQUEST, "invalid JSON body");
        }
    };

    if let Err(rejection) = state.service.check_batch(&request) {
        tracing::debug!(reason = rejection.message(), "Rejecting batch");
        return error_response(StatusCode::BAD_REQUEST, rejection.message());
    }

    let meta = RequestMeta {
        remote_addr: connect_info.map(|ConnectInfo(addr)| addr),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let service = state.service.clone();
    let result =
        tokio::task::spawn_blocking(move || service.process(request, &meta)).await;

    match result {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Batch processing failed");
            error_response(StatusCode::BAD_GATEWAY, "event store unavailable")
        }
        Err(e) => {
            tracing::error!(error = %e, "Ingestion task failed");
            error_response(StatusCode::BAD_GATEWAY, "event store unavailable")
        }
    }
}

/// GET /healthz
async fn healthz(State(state): State<AppState>) -> Response {
    let service = state.service.clone();
    let healthy = tokio::task::spawn_blocking(move || service.store().health_check())
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);

    if healthy {
        (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
    } else {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
