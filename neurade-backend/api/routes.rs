use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use hyper::StatusCode;
use hyper::header;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use super::middleware;
use super::AppState;

pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new().route(
        "/",
        get(|| async {
            Json(json!({
                "status": "ok",
            }))
        }),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/health", health_routes)
        .merge(pipeline_router())
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(axum::middleware::from_fn(middleware::strip_trailing_slash))
        .layer(axum::middleware::from_fn(middleware::trace_request))
}

fn pipeline_router() -> Router<AppState> {
    Router::new()
        .merge(super::webhooks::router())
        .merge(super::listen::router())
        .merge(super::agent::router())
        .merge(super::pull_requests::router())
        .merge(super::chats::router())
        .merge(super::llms::router())
}

async fn not_found(req: axum::extract::Request) -> impl IntoResponse {
    tracing::warn!("unhandled path: {}", req.uri());
    (StatusCode::NOT_FOUND, "Not Found")
}
