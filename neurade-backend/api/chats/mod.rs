pub mod handlers;

use axum::routing::get;
use axum::Router;

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/chats/history/{course_id}/{user_id}/{pr_number}",
        get(handlers::history),
    )
}
