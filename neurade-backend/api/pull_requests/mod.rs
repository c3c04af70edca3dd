pub mod handlers;

use axum::routing::{get, post};
use axum::Router;

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/pull-requests/{pr_id}/review",
            post(handlers::post_review),
        )
        .route(
            "/pull-requests/course/{course_id}",
            get(handlers::list_for_course),
        )
}
