use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::Result;
use crate::store::ThreadKey;

/// GET /chats/history/{course_id}/{user_id}/{pr_number}
/// Messages in arrival order. An unknown thread is simply empty.
pub(crate) async fn history(
    State(state): State<AppState>,
    Path((course_id, user_id, pr_number)): Path<(i64, i64, i64)>,
) -> Result<Json<Value>> {
    let thread = ThreadKey {
        course_id,
        user_id,
        pr_number,
    };
    let messages = state.pipeline.store.chat_history(thread).await?;
    Ok(Json(json!({
        "course_id": course_id,
        "user_id": user_id,
        "pr_number": pr_number,
        "messages": messages,
    })))
}
