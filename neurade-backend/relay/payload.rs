use serde::Deserialize;
use serde_json::Value;

use crate::github::models::PrLifecycle;

pub const PULL_REQUEST_PATH: &str = "/listen/pull-request";
pub const COMMENTS_PATH: &str = "/listen/comments";

#[derive(Debug, Deserialize)]
pub struct Account {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestPayload {
    #[serde(default)]
    pub action: String,
    pub pull_request: PullRequestBody,
    pub repository: Repository,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestBody {
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub merged_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub user: Account,
}

#[derive(Debug, Deserialize)]
pub struct IssueCommentPayload {
    #[serde(default)]
    pub action: String,
    pub issue: Issue,
    pub comment: IssueComment,
    pub repository: Repository,
}

#[derive(Debug, Deserialize)]
pub struct Issue {
    pub number: i64,
}

#[derive(Debug, Deserialize)]
pub struct IssueComment {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author_association: String,
    pub user: Account,
}

#[derive(Debug, Deserialize)]
pub struct ReviewCommentPayload {
    #[serde(default)]
    pub action: String,
    pub comment: ReviewComment,
    pub repository: Repository,
}

#[derive(Debug, Deserialize)]
pub struct ReviewComment {
    pub id: i64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author_association: String,
    pub user: Account,
    pub pull_request_url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub commit_id: String,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub line: Option<i64>,
    #[serde(default)]
    pub side: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewPayload {
    #[serde(default)]
    pub action: String,
    pub review: Review,
    pub pull_request: ReviewedPullRequest,
    pub repository: Repository,
}

#[derive(Debug, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author_association: String,
    #[serde(default)]
    pub state: String,
    pub user: Account,
}

#[derive(Debug, Deserialize)]
pub struct ReviewedPullRequest {
    pub number: i64,
}

/// The webhook deliveries the relay understands.
#[derive(Debug)]
pub enum WebhookEvent {
    PullRequest(PullRequestPayload),
    IssueComment(IssueCommentPayload),
    ReviewComment(ReviewCommentPayload),
    Review(ReviewPayload),
}

/// Flattened form body and the backend path it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    pub path: &'static str,
    pub fields: Vec<(&'static str, String)>,
}

#[cfg(test)]
impl Forward {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl WebhookEvent {
    /// Decode a delivery. The `X-GitHub-Event` header decides the schema
    /// when present; otherwise each schema is tried in a fixed order. Returns
    /// `Ok(None)` for events the relay does not handle.
    pub fn decode(event_header: Option<&str>, payload: &Value) -> serde_json::Result<Option<Self>> {
        match event_header.map(str::trim).filter(|h| !h.is_empty()) {
            Some("pull_request") => PullRequestPayload::deserialize(payload)
                .map(|p| Some(WebhookEvent::PullRequest(p))),
            Some("issue_comment") => IssueCommentPayload::deserialize(payload)
                .map(|p| Some(WebhookEvent::IssueComment(p))),
            Some("pull_request_review_comment") => ReviewCommentPayload::deserialize(payload)
                .map(|p| Some(WebhookEvent::ReviewComment(p))),
            Some("pull_request_review") => {
                ReviewPayload::deserialize(payload).map(|p| Some(WebhookEvent::Review(p)))
            }
            Some(_) => Ok(None),
            None => Ok(Self::infer(payload)),
        }
    }

    // Review and review-comment payloads also carry `pull_request`, so the
    // plain pull request schema is tried last.
    fn infer(payload: &Value) -> Option<Self> {
        if let Ok(p) = ReviewPayload::deserialize(payload) {
            return Some(WebhookEvent::Review(p));
        }
        if let Ok(p) = IssueCommentPayload::deserialize(payload) {
            return Some(WebhookEvent::IssueComment(p));
        }
        if let Ok(p) = ReviewCommentPayload::deserialize(payload) {
            return Some(WebhookEvent::ReviewComment(p));
        }
        PullRequestPayload::deserialize(payload)
            .ok()
            .map(WebhookEvent::PullRequest)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::PullRequest(_) => "pull_request",
            WebhookEvent::IssueComment(_) => "issue_comment",
            WebhookEvent::ReviewComment(_) => "pull_request_review_comment",
            WebhookEvent::Review(_) => "pull_request_review",
        }
    }

    /// Flatten into the backend listener form. Reviews without a body carry
    /// nothing to ingest and yield `None`.
    pub fn into_forward(self) -> Option<Forward> {
        match self {
            WebhookEvent::PullRequest(p) => {
                let pr = p.pull_request;
                let status = PrLifecycle::from_github(&pr.state, pr.merged_at.is_some());
                Some(Forward {
                    path: PULL_REQUEST_PATH,
                    fields: vec![
                        ("action", p.action),
                        ("pr_name", pr.title),
                        ("pr_description", pr.body.unwrap_or_default()),
                        ("pr_number", pr.number.to_string()),
                        ("pr_user", pr.user.login.clone()),
                        ("user", pr.user.login),
                        ("repo_url", p.repository.html_url),
                        ("status", status.as_str().to_string()),
                        ("created_at", pr.created_at.unwrap_or_default()),
                        ("updated_at", pr.updated_at.unwrap_or_default()),
                    ],
                })
            }
            WebhookEvent::IssueComment(p) => Some(Forward {
                path: COMMENTS_PATH,
                fields: vec![
                    ("action", p.action),
                    ("body", p.comment.body),
                    ("author_association", p.comment.author_association),
                    ("user", p.comment.user.login),
                    ("repository_url", p.repository.html_url),
                    ("pr_number", p.issue.number.to_string()),
                ],
            }),
            WebhookEvent::ReviewComment(p) => {
                let c = p.comment;
                let pr_number = c
                    .pull_request_url
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let mut fields = vec![
                    ("action", p.action),
                    ("body", c.body),
                    ("author_association", c.author_association),
                    ("user", c.user.login),
                    ("repository_url", p.repository.html_url),
                    ("pr_number", pr_number),
                    ("file", c.path),
                    ("commit_id", c.commit_id),
                    ("comment_id", c.id.to_string()),
                ];
                if let Some(position) = c.position {
                    fields.push(("position", position.to_string()));
                }
                if let Some(line) = c.line {
                    fields.push(("line", line.to_string()));
                }
                if let Some(side) = c.side {
                    fields.push(("side", side));
                }
                Some(Forward {
                    path: COMMENTS_PATH,
                    fields,
                })
            }
            WebhookEvent::Review(p) => {
                let body = p.review.body.filter(|b| !b.trim().is_empty())?;
                Some(Forward {
                    path: COMMENTS_PATH,
                    fields: vec![
                        ("action", p.action),
                        ("body", body),
                        ("author_association", p.review.author_association),
                        ("user", p.review.user.login),
                        ("repository_url", p.repository.html_url),
                        ("pr_number", p.pull_request.number.to_string()),
                        ("state", p.review.state),
                    ],
                })
            }
        }
    }
}
