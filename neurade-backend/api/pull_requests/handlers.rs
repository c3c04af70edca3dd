use axum::extract::{Path, State};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{required_id, AppState};
use crate::error::{PipelineError, Result};
use crate::store::{PullRequestRecord, ReviewResult};

#[derive(Deserialize)]
pub(crate) struct PostReviewForm {
    #[serde(default)]
    course_id: String,
    /// JSON `{summary, comments: [{path, position, body}]}`.
    #[serde(default)]
    review: String,
}

/// POST /pull-requests/{pr_id}/review
/// Store a (possibly hand-edited) review, post it to GitHub and mark the PR
/// `Done`. Runs in the request, so GitHub failures come back as 502/504.
#[tracing::instrument(skip_all, fields(pr_id))]
pub(crate) async fn post_review(
    State(state): State<AppState>,
    Path(pr_id): Path<i64>,
    Form(form): Form<PostReviewForm>,
) -> Result<Json<Value>> {
    tracing::Span::current().record("pr_id", pr_id);
    let course_id = required_id("course_id", &form.course_id)?;
    let review: ReviewResult = serde_json::from_str(&form.review)
        .map_err(|e| PipelineError::validation(format!("review is not valid JSON: {e}")))?;
    if review.is_empty() {
        return Err(PipelineError::validation("review has no summary or comments"));
    }

    state
        .pipeline
        .publish_manual_review(pr_id, course_id, &review)
        .await?;

    Ok(Json(json!({ "message": "Review posted", "pr_id": pr_id })))
}

/// GET /pull-requests/course/{course_id}
pub(crate) async fn list_for_course(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> Result<Json<Vec<PullRequestRecord>>> {
    state.pipeline.store.get_course(course_id).await?;
    let prs = state.pipeline.store.list_pull_requests(course_id).await?;
    Ok(Json(prs))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{form_post, get, json_body};
    use crate::api::{create_app, AppState};
    use crate::pipeline::testing::{course_fixture, remote_pr, TestHarness};
    use crate::store::{GradingStatus, Store};
    use axum::Router;
    use hyper::StatusCode;
    use tower::ServiceExt;

    async fn setup() -> (TestHarness, Router, i64) {
        let harness = TestHarness::new().await;
        harness.seed_course(course_fixture(1)).await;
        harness.github.set_prs(vec![remote_pr(5)]);
        harness.pipeline.sync_pull_requests(1).await.unwrap();
        let pr_id = harness.store.list_pull_requests(1).await.unwrap()[0].id;
        let app = create_app(AppState {
            pipeline: harness.pipeline.clone(),
        });
        (harness, app, pr_id)
    }

    const REVIEW: &str = "course_id=1&review=%7B%22summary%22%3A%22Looks+good%22%2C%22comments%22%3A%5B%7B%22path%22%3A%22src%2Flib.rs%22%2C%22position%22%3A2%2C%22body%22%3A%22nit%22%7D%5D%7D";

    #[tokio::test]
    async fn manual_review_is_posted_and_done() {
        let (harness, app, pr_id) = setup().await;
        let response = app
            .oneshot(form_post(&format!("/pull-requests/{pr_id}/review"), REVIEW))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let pr = harness.store.get_pull_request(pr_id).await.unwrap();
        assert_eq!(pr.grading_status, GradingStatus::Done);
        assert_eq!(pr.result.unwrap().summary, "Looks good");

        let posted = harness.github.reviews_posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, 5);
        assert_eq!(posted[0].1, "teacher-token");
        assert_eq!(posted[0].2.comments.len(), 1);
    }

    #[tokio::test]
    async fn github_failure_is_bad_gateway() {
        let (harness, app, pr_id) = setup().await;
        harness
            .github
            .fail_posts
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let response = app
            .oneshot(form_post(&format!("/pull-requests/{pr_id}/review"), REVIEW))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let pr = harness.store.get_pull_request(pr_id).await.unwrap();
        assert_eq!(pr.grading_status, GradingStatus::Graded);
    }

    #[tokio::test]
    async fn malformed_review_is_400() {
        let (_harness, app, pr_id) = setup().await;
        let response = app
            .oneshot(form_post(
                &format!("/pull-requests/{pr_id}/review"),
                "course_id=1&review=not-json",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lists_course_pull_requests() {
        let (_harness, app, _) = setup().await;
        let response = app
            .clone()
            .oneshot(get("/pull-requests/course/1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["pr_number"], 5);
        assert_eq!(body[0]["grading_status"], "Not Graded");

        let response = app.oneshot(get("/pull-requests/course/9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
