pub mod import;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::github::models::{PrLifecycle, ReviewComment};

pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing)]
    pub github_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    /// Teacher account that owns the course.
    pub user_id: i64,
    pub name: String,
    pub github_url: String,
    /// GitHub login of the repository owner.
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub auto_grade: bool,
    /// Storage path of the coding-convention reference file.
    #[serde(default)]
    pub convention_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub course_id: i64,
    pub name: String,
    /// Storage path of the answer file.
    #[serde(default)]
    pub answer_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCredential {
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub provider: String,
    pub model_id: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub status: String,
}

impl LlmCredential {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Grading lifecycle of a pull request: `Not Graded → Graded → Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradingStatus {
    #[serde(rename = "Not Graded")]
    NotGraded,
    Graded,
    Done,
}

impl GradingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradingStatus::NotGraded => "Not Graded",
            GradingStatus::Graded => "Graded",
            GradingStatus::Done => "Done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Not Graded" => Some(GradingStatus::NotGraded),
            "Graded" => Some(GradingStatus::Graded),
            "Done" => Some(GradingStatus::Done),
            _ => None,
        }
    }
}

/// Structured outcome of an LLM review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub comments: Vec<ReviewComment>,
}

impl ReviewResult {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.comments.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PullRequestRecord {
    pub id: i64,
    pub course_id: i64,
    pub assignment_id: Option<i64>,
    pub pr_number: i64,
    pub pr_name: String,
    pub pr_description: String,
    pub status: PrLifecycle,
    pub grading_status: GradingStatus,
    pub result: Option<ReviewResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PullRequestRecord {
    /// Already reviewed in the current grading cycle. An empty review the
    /// agent returned still counts.
    pub fn is_processed(&self) -> bool {
        self.result.is_some() && self.grading_status != GradingStatus::NotGraded
    }
}

/// GitHub-owned fields of a pull request. Grading fields are never part of
/// an upsert.
#[derive(Debug, Clone)]
pub struct PullRequestUpsert {
    pub course_id: i64,
    pub pr_number: i64,
    pub pr_name: String,
    pub pr_description: String,
    pub status: PrLifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: PullRequestRecord,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Teacher,
    Student,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::Teacher => "teacher",
            ChatRole::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "teacher" => Some(ChatRole::Teacher),
            "student" => Some(ChatRole::Student),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub message: String,
}

/// Identity of a chat thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub course_id: i64,
    pub user_id: i64,
    pub pr_number: i64,
}

/// Data access consumed by the review pipeline.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<User>;
    /// GitHub token of the first super admin that has one.
    async fn find_super_admin_token(&self) -> Result<Option<String>>;

    async fn get_course(&self, id: i64) -> Result<Course>;
    /// Course whose GitHub URL matches `repo_url` after normalization.
    async fn find_course_by_repo_url(&self, repo_url: &str) -> Result<Option<Course>>;

    async fn list_assignments(&self, course_id: i64) -> Result<Vec<Assignment>>;
    async fn get_assignment(&self, id: i64) -> Result<Assignment>;

    async fn get_llm(&self, id: i64) -> Result<LlmCredential>;
    /// Credentials owned by `user_id`, oldest first.
    async fn list_llms_by_owner(&self, user_id: i64) -> Result<Vec<LlmCredential>>;

    async fn upsert_pull_request(&self, pr: PullRequestUpsert) -> Result<UpsertOutcome>;
    async fn get_pull_request(&self, id: i64) -> Result<PullRequestRecord>;
    async fn list_pull_requests(&self, course_id: i64) -> Result<Vec<PullRequestRecord>>;
    /// Store a review result and mark the PR `Graded` in one write.
    async fn record_review(
        &self,
        pr_id: i64,
        assignment_id: Option<i64>,
        result: &ReviewResult,
    ) -> Result<()>;
    async fn set_grading_status(&self, pr_id: i64, status: GradingStatus) -> Result<()>;

    async fn append_chat_message(&self, thread: ThreadKey, entry: ChatEntry) -> Result<()>;
    async fn chat_history(&self, thread: ThreadKey) -> Result<Vec<ChatEntry>>;

    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn insert_course(&self, course: &Course) -> Result<()>;
    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()>;
    async fn insert_llm(&self, llm: &LlmCredential) -> Result<()>;
}
