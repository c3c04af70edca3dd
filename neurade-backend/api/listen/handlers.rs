use axum::extract::State;
use axum::{Form, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{required_id, AppState};
use crate::error::{PipelineError, Result};
use crate::github::models::PrLifecycle;
use crate::pipeline::chat::CommentEvent;
use crate::pipeline::routing::CommentAnchor;
use crate::pipeline::sync::PullRequestEvent;

#[derive(Deserialize)]
pub(crate) struct PullRequestForm {
    #[serde(default)]
    pr_name: String,
    #[serde(default)]
    pr_description: String,
    #[serde(default)]
    pr_number: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    repo_url: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
}

#[derive(Deserialize)]
pub(crate) struct CommentForm {
    #[serde(default)]
    body: String,
    #[serde(default)]
    author_association: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    repository_url: String,
    #[serde(default)]
    pr_number: String,
    #[serde(default)]
    file: String,
    #[serde(default)]
    position: String,
    #[serde(default)]
    commit_id: String,
    #[serde(default)]
    comment_id: String,
    #[serde(default)]
    side: String,
}

fn timestamp_or_now(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// Some relays render a missing body as "<nil>".
fn clean_description(raw: String) -> String {
    if matches!(raw.trim(), "<nil>" | "nil") {
        String::new()
    } else {
        raw
    }
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn optional_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

impl TryFrom<PullRequestForm> for PullRequestEvent {
    type Error = PipelineError;

    fn try_from(form: PullRequestForm) -> Result<Self> {
        if form.repo_url.trim().is_empty() {
            return Err(PipelineError::validation("repo_url is required"));
        }
        if form.pr_name.trim().is_empty() {
            return Err(PipelineError::validation("pr_name is required"));
        }
        let pr_number = required_id("pr_number", &form.pr_number)?;
        Ok(PullRequestEvent {
            repo_url: form.repo_url,
            pr_number,
            pr_name: form.pr_name,
            pr_description: clean_description(form.pr_description),
            status: PrLifecycle::from_github(form.status.trim(), false),
            created_at: timestamp_or_now(&form.created_at),
            updated_at: timestamp_or_now(&form.updated_at),
        })
    }
}

/// POST /listen/pull-request
#[tracing::instrument(skip_all)]
pub(crate) async fn pull_request(
    State(state): State<AppState>,
    Form(form): Form<PullRequestForm>,
) -> Result<Json<Value>> {
    let user = form.user.clone();
    let event = PullRequestEvent::try_from(form)?;
    let outcome = state.pipeline.handle_pull_request_event(event).await?;
    tracing::debug!(user = %user, pr_id = outcome.record.id, "pull request listener done");

    let message = if outcome.created {
        "Pull request created"
    } else {
        "Pull request updated"
    };
    Ok(Json(json!({
        "message": message,
        "created": outcome.created,
        "pull_request": outcome.record,
    })))
}

/// POST /listen/comments
/// Every comment lands in the chat thread; a `@bot` mention also queues a reply.
#[tracing::instrument(skip_all)]
pub(crate) async fn comments(
    State(state): State<AppState>,
    Form(form): Form<CommentForm>,
) -> Result<Json<Value>> {
    if form.body.trim().is_empty()
        || form.user.trim().is_empty()
        || form.repository_url.trim().is_empty()
    {
        return Err(PipelineError::validation(
            "body, user and repository_url are required",
        ));
    }
    let pr_number = match optional_int(&form.pr_number) {
        Some(n) if n > 0 => n,
        _ => {
            tracing::warn!(pr_number = %form.pr_number, "comment without a usable PR number, skipping");
            return Ok(Json(json!({ "message": "Comment skipped: no pull request number" })));
        }
    };

    let event = CommentEvent {
        repository_url: form.repository_url,
        pr_number,
        body: form.body,
        user: form.user,
        author_association: form.author_association,
        anchor: CommentAnchor {
            comment_id: optional_int(&form.comment_id),
            commit_id: optional(form.commit_id),
            path: optional(form.file),
            position: optional_int(&form.position),
            side: optional(form.side),
        },
    };

    let outcome = state.pipeline.ingest_comment(event).await?;
    Ok(Json(json!({
        "message": "Comment stored",
        "role": outcome.role,
        "bot_reply_queued": outcome.mentioned_bot,
    })))
}
