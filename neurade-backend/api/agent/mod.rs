pub mod handlers;

use axum::routing::post;
use axum::Router;

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agent/review-pr", post(handlers::review_pr))
        .route("/agent/review-pr-auto", post(handlers::review_pr_auto))
}
