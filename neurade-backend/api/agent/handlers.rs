use axum::extract::State;
use axum::{Form, Json};
use serde::Deserialize;

use crate::api::{id_list, required_id, AppState};
use crate::error::Result;
use crate::pipeline::grader::{AutoGradeReport, ReviewReport};

#[derive(Deserialize)]
pub(crate) struct ReviewForm {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    course_id: String,
    #[serde(default)]
    llm_id: String,
    #[serde(default)]
    assignment_id: String,
    /// Comma-separated internal PR ids.
    #[serde(default)]
    pr_ids: String,
}

#[derive(Deserialize)]
pub(crate) struct AutoReviewForm {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    course_id: String,
    #[serde(default)]
    llm_id: String,
}

/// POST /agent/review-pr
/// Review the listed PRs against one assignment. Per-PR failures are in the
/// report; the status is 200 regardless.
#[tracing::instrument(skip_all)]
pub(crate) async fn review_pr(
    State(state): State<AppState>,
    Form(form): Form<ReviewForm>,
) -> Result<Json<ReviewReport>> {
    let user_id = required_id("user_id", &form.user_id)?;
    let course_id = required_id("course_id", &form.course_id)?;
    let llm_id = required_id("llm_id", &form.llm_id)?;
    let assignment_id = required_id("assignment_id", &form.assignment_id)?;
    let pr_ids = id_list("pr_ids", &form.pr_ids)?;

    let report = state
        .pipeline
        .review_single_pr(user_id, course_id, llm_id, assignment_id, &pr_ids)
        .await?;
    Ok(Json(report))
}

/// POST /agent/review-pr-auto
/// Sweep every ungraded PR of the course.
#[tracing::instrument(skip_all)]
pub(crate) async fn review_pr_auto(
    State(state): State<AppState>,
    Form(form): Form<AutoReviewForm>,
) -> Result<Json<AutoGradeReport>> {
    let user_id = required_id("user_id", &form.user_id)?;
    let course_id = required_id("course_id", &form.course_id)?;
    let llm_id = required_id("llm_id", &form.llm_id)?;

    let report = state
        .pipeline
        .auto_grade_course(user_id, course_id, llm_id)
        .await?;
    Ok(Json(report))
}
