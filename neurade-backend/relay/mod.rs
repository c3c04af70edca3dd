pub mod forward;
pub mod payload;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hyper::StatusCode;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

use crate::api::middleware;
use forward::Forwarder;
use payload::WebhookEvent;

const SECRET_HEADER: &str = "x-secret-token";
const EVENT_HEADER: &str = "x-github-event";

#[derive(Clone)]
pub struct RelayState {
    /// Shared secret GitHub is configured with. `None` rejects every delivery.
    pub secret: Option<String>,
    pub forwarder: Arc<dyn Forwarder>,
}

pub fn create_relay_app(state: RelayState) -> Router {
    Router::new()
        .route("/", post(receive_webhook))
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::trace_request))
}

fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(token);
    }
    headers
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn is_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return false;
    };
    match presented_secret(headers) {
        Some(given) => bool::from(given.trim().as_bytes().ct_eq(expected.as_bytes())),
        None => false,
    }
}

#[tracing::instrument(skip_all, fields(event))]
async fn receive_webhook(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !is_authorized(state.secret.as_deref(), &headers) {
        tracing::warn!("rejected webhook delivery with missing or invalid secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        )
            .into_response();
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid JSON payload: {e}") })),
            )
                .into_response();
        }
    };

    let event_header = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    let event = match WebhookEvent::decode(event_header, &payload) {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::info!(event = event_header.unwrap_or("unknown"), "ignoring webhook event");
            return Json(json!({ "status": "ignored" })).into_response();
        }
        Err(e) => {
            tracing::warn!(event = event_header.unwrap_or("unknown"), error = %e, "malformed webhook payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("malformed {} payload: {e}", event_header.unwrap_or("webhook")) })),
            )
                .into_response();
        }
    };

    let kind = event.kind();
    tracing::Span::current().record("event", kind);

    let Some(forward) = event.into_forward() else {
        tracing::info!(event = kind, "nothing to forward");
        return Json(json!({ "status": "ignored" })).into_response();
    };

    // GitHub redelivers on its own; a failed forward is not reported back.
    match state.forwarder.forward(&forward).await {
        Ok(()) => tracing::info!(event = kind, path = forward.path, "webhook forwarded"),
        Err(e) => tracing::error!(event = kind, path = forward.path, error = %e, "failed to forward webhook"),
    }

    Json(json!({ "status": "ok", "event": kind })).into_response()
}
