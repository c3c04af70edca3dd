pub mod handlers;

use axum::routing::post;
use axum::Router;

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/llms/validate-key", post(handlers::validate_key))
}
