pub mod handlers;

use axum::routing::post;
use axum::Router;

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/webhooks/fetch-pull-requests",
        post(handlers::fetch_pull_requests),
    )
}
