pub mod handlers;

use axum::routing::post;
use axum::Router;

use crate::api::AppState;

/// Endpoints the webhook relay forwards to.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/listen/pull-request", post(handlers::pull_request))
        .route("/listen/comments", post(handlers::comments))
}
