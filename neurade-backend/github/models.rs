use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner/name pair of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub repo: String,
}

impl RepoCoordinates {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Pull request as returned by `GET /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePullRequest {
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub head: PrHead,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrHead {
    pub sha: String,
}

impl RemotePullRequest {
    pub fn lifecycle(&self) -> PrLifecycle {
        PrLifecycle::from_github(&self.state, self.merged_at.is_some())
    }
}

/// Mirrors the GitHub state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrLifecycle {
    Open,
    Closed,
    Merged,
}

impl PrLifecycle {
    pub fn from_github(state: &str, merged: bool) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "merged" => PrLifecycle::Merged,
            "closed" if merged => PrLifecycle::Merged,
            "closed" => PrLifecycle::Closed,
            _ => PrLifecycle::Open,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrLifecycle::Open => "open",
            PrLifecycle::Closed => "closed",
            PrLifecycle::Merged => "merged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
    Comment,
    Approve,
    RequestChanges,
}

/// Inline comment attached to a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub path: String,
    pub position: i64,
    pub body: String,
}

/// Body of `POST /repos/{owner}/{repo}/pulls/{n}/reviews`.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewSubmission {
    pub commit_id: String,
    pub body: String,
    pub event: ReviewEvent,
    pub comments: Vec<ReviewComment>,
}

/// Where a comment is placed on a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentTarget {
    /// Reply to an existing review comment.
    ReviewReply { comment_id: i64 },
    /// New review comment anchored to a file position.
    Inline {
        commit_id: String,
        path: String,
        position: i64,
        side: Option<String>,
    },
    /// Plain conversation comment on the PR.
    Issue,
}

impl CommentTarget {
    pub fn tier(&self) -> &'static str {
        match self {
            CommentTarget::ReviewReply { .. } => "reply",
            CommentTarget::Inline { .. } => "inline",
            CommentTarget::Issue => "issue",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_from_github_state() {
        assert_eq!(PrLifecycle::from_github("open", false), PrLifecycle::Open);
        assert_eq!(PrLifecycle::from_github("closed", false), PrLifecycle::Closed);
        assert_eq!(PrLifecycle::from_github("closed", true), PrLifecycle::Merged);
        assert_eq!(PrLifecycle::from_github("MERGED", false), PrLifecycle::Merged);
        assert_eq!(PrLifecycle::from_github("", false), PrLifecycle::Open);
    }

    #[test]
    fn review_event_serializes_screaming_case() {
        let json = serde_json::to_string(&ReviewEvent::RequestChanges).unwrap();
        assert_eq!(json, "\"REQUEST_CHANGES\"");
        let json = serde_json::to_string(&ReviewEvent::Comment).unwrap();
        assert_eq!(json, "\"COMMENT\"");
    }

    #[test]
    fn remote_pr_deserializes_with_missing_body() {
        let pr: RemotePullRequest = serde_json::from_value(serde_json::json!({
            "number": 7,
            "title": "Lab 1",
            "state": "closed",
            "merged_at": "2024-03-01T10:00:00Z",
            "created_at": "2024-02-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z",
            "head": {"sha": "abc123", "ref": "lab-1"}
        }))
        .unwrap();
        assert_eq!(pr.number, 7);
        assert!(pr.body.is_none());
        assert_eq!(pr.lifecycle(), PrLifecycle::Merged);
        assert_eq!(pr.head.sha, "abc123");
    }
}
