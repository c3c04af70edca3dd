use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::github::models::ReviewComment;
use crate::store::{ChatEntry, ReviewResult};

/// Prompt sent with manually triggered reviews.
pub const MANUAL_REVIEW_QUERY: &str = "How does this PR look? Review it thoroughly and carefully, \
     and give detailed suggestions where needed.";

/// Body of `POST /api/review`.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub github_token: String,
    pub api_key: String,
    pub query: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub pr_number: i64,
    pub answer_file_path: String,
    pub coding_convention_path: String,
    pub model: String,
}

/// Body of `POST /api/review-auto`.
#[derive(Debug, Clone, Serialize)]
pub struct AutoReviewRequest {
    pub github_token: String,
    pub api_key: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub pr_description: String,
    pub pr_number: i64,
    /// Assignment name → answer file URL.
    pub answer_file_paths: BTreeMap<String, String>,
    pub coding_convention_path: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub comments: Vec<ReviewComment>,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

impl AgentResponse {
    pub fn to_result(&self) -> ReviewResult {
        ReviewResult {
            summary: self.summary.clone(),
            comments: self.comments.clone(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub api_key: String,
    pub model: String,
    pub query: String,
    pub file_queried_on: String,
    pub answer_file_path: String,
    pub previous_comment: Vec<ChatEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub query: String,
    #[serde(default)]
    pub receptionist_response: Option<ReceptionistResponse>,
    /// Empty means the service had no answer to post.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub assistant_response: String,
}

/// The chat service sends `null` where it has no text.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReceptionistResponse {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub problem_summarization: String,
    #[serde(default)]
    pub context_summarization: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateKeyRequest {
    pub provider: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateKeyResponse {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChatRole;

    #[test]
    fn chat_request_serializes_previous_comments() {
        let req = ChatRequest {
            api_key: "k".into(),
            model: "m".into(),
            query: "@bot why?".into(),
            file_queried_on: "src/lib.rs".into(),
            answer_file_path: "https://files/a.md".into(),
            previous_comment: vec![ChatEntry {
                role: ChatRole::Student,
                message: "hello".into(),
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["previous_comment"][0]["role"], "student");
        assert_eq!(json["previous_comment"][0]["message"], "hello");
        assert_eq!(json["file_queried_on"], "src/lib.rs");
    }

    #[test]
    fn agent_response_tolerates_missing_fields() {
        let resp: AgentResponse = serde_json::from_str(r#"{"summary": "ok"}"#).unwrap();
        assert_eq!(resp.summary, "ok");
        assert!(resp.comments.is_empty());
        assert_eq!(resp.to_result().summary, "ok");
    }

    #[test]
    fn chat_response_without_receptionist() {
        let resp: ChatResponse =
            serde_json::from_str(r#"{"query": "q", "assistant_response": "a"}"#).unwrap();
        assert!(resp.receptionist_response.is_none());
        assert_eq!(resp.assistant_response, "a");
    }

    #[test]
    fn chat_response_null_assistant_is_empty() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"query": "q", "receptionist_response": null, "assistant_response": null}"#,
        )
        .unwrap();
        assert_eq!(resp.query, "q");
        assert!(resp.receptionist_response.is_none());
        assert!(resp.assistant_response.is_empty());
    }
}
