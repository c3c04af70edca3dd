use axum::extract::State;
use axum::{Form, Json};
use serde::Deserialize;

use crate::api::{required_id, AppState};
use crate::error::Result;
use crate::pipeline::sync::SyncReport;

#[derive(Deserialize)]
pub(crate) struct FetchForm {
    #[serde(default)]
    course_id: String,
}

/// POST /webhooks/fetch-pull-requests
/// Pull every PR of the course's repository into the store.
#[tracing::instrument(skip_all)]
pub(crate) async fn fetch_pull_requests(
    State(state): State<AppState>,
    Form(form): Form<FetchForm>,
) -> Result<Json<SyncReport>> {
    let course_id = required_id("course_id", &form.course_id)?;
    let report = state.pipeline.sync_pull_requests(course_id).await?;
    Ok(Json(report))
}
