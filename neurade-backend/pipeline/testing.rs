//! In-process doubles for pipeline tests.

use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use crate::agent::client::AgentClient;
use crate::agent::models::{
    AgentResponse, AutoReviewRequest, ChatRequest, ChatResponse, ReviewRequest,
    ValidateKeyRequest, ValidateKeyResponse,
};
use crate::error::{PipelineError, Result};
use crate::github::client::GithubClient;
use crate::github::models::{
    CommentTarget, PrHead, RemotePullRequest, RepoCoordinates, ReviewComment, ReviewSubmission,
};
use crate::storage::{PresignError, Presigner};
use crate::store::{Assignment, Course, LlmCredential, SqliteStore, Store, User};
use crate::tasks::{Job, TaskQueue};

use super::Pipeline;

pub struct MockGithubClient {
    pub prs: StdMutex<Vec<RemotePullRequest>>,
    pub list_tokens: StdMutex<Vec<String>>,
    pub reviews_posted: StdMutex<Vec<(i64, String, ReviewSubmission)>>,
    pub comments_posted: StdMutex<Vec<(i64, CommentTarget, String)>>,
    pub sha_requests: StdMutex<Vec<i64>>,
    pub fail_posts: AtomicBool,
}

impl MockGithubClient {
    pub fn new() -> Self {
        Self {
            prs: StdMutex::new(Vec::new()),
            list_tokens: StdMutex::new(Vec::new()),
            reviews_posted: StdMutex::new(Vec::new()),
            comments_posted: StdMutex::new(Vec::new()),
            sha_requests: StdMutex::new(Vec::new()),
            fail_posts: AtomicBool::new(false),
        }
    }

    pub fn set_prs(&self, prs: Vec<RemotePullRequest>) {
        *self.prs.lock().unwrap() = prs;
    }

    fn post_failure(&self) -> Result<()> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(PipelineError::Upstream {
                service: "github",
                status: 422,
                body: "Unprocessable Entity".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GithubClient for MockGithubClient {
    async fn list_pull_requests(
        &self,
        _repo: &RepoCoordinates,
        token: &str,
    ) -> Result<Vec<RemotePullRequest>> {
        self.list_tokens.lock().unwrap().push(token.to_string());
        Ok(self.prs.lock().unwrap().clone())
    }

    async fn head_commit_sha(
        &self,
        _repo: &RepoCoordinates,
        pr_number: i64,
        _token: &str,
    ) -> Result<String> {
        self.sha_requests.lock().unwrap().push(pr_number);
        Ok(format!("head-{pr_number}"))
    }

    async fn post_review(
        &self,
        _repo: &RepoCoordinates,
        pr_number: i64,
        token: &str,
        review: &ReviewSubmission,
    ) -> Result<()> {
        self.post_failure()?;
        self.reviews_posted
            .lock()
            .unwrap()
            .push((pr_number, token.to_string(), review.clone()));
        Ok(())
    }

    async fn post_comment(
        &self,
        _repo: &RepoCoordinates,
        pr_number: i64,
        _token: &str,
        target: &CommentTarget,
        body: &str,
    ) -> Result<()> {
        self.post_failure()?;
        self.comments_posted
            .lock()
            .unwrap()
            .push((pr_number, target.clone(), body.to_string()));
        Ok(())
    }
}

pub struct MockAgentClient {
    pub failing_prs: StdMutex<Vec<i64>>,
    pub auto_requests: StdMutex<Vec<AutoReviewRequest>>,
    pub review_requests: StdMutex<Vec<ReviewRequest>>,
    pub chat_requests: StdMutex<Vec<ChatRequest>>,
    pub chat_reply: StdMutex<String>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self {
            failing_prs: StdMutex::new(Vec::new()),
            auto_requests: StdMutex::new(Vec::new()),
            review_requests: StdMutex::new(Vec::new()),
            chat_requests: StdMutex::new(Vec::new()),
            chat_reply: StdMutex::new("Try borrowing instead of cloning.".into()),
        }
    }

    fn respond(&self, pr_number: i64) -> Result<AgentResponse> {
        if self.failing_prs.lock().unwrap().contains(&pr_number) {
            return Err(PipelineError::Upstream {
                service: "agent",
                status: 500,
                body: "model overloaded".into(),
            });
        }
        Ok(AgentResponse {
            summary: format!("Review of #{pr_number}"),
            comments: vec![ReviewComment {
                path: "src/main.rs".into(),
                position: 1,
                body: "consider a match here".into(),
            }],
            input_tokens: None,
            output_tokens: None,
        })
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    async fn review(&self, request: &ReviewRequest) -> Result<AgentResponse> {
        self.review_requests.lock().unwrap().push(request.clone());
        self.respond(request.pr_number)
    }

    async fn review_auto(&self, request: &AutoReviewRequest) -> Result<AgentResponse> {
        self.auto_requests.lock().unwrap().push(request.clone());
        self.respond(request.pr_number)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.chat_requests.lock().unwrap().push(request.clone());
        Ok(ChatResponse {
            query: request.query.clone(),
            receptionist_response: None,
            assistant_response: self.chat_reply.lock().unwrap().clone(),
        })
    }

    async fn validate_key(&self, request: &ValidateKeyRequest) -> Result<ValidateKeyResponse> {
        Ok(ValidateKeyResponse {
            is_valid: request.api_key.starts_with("sk-"),
            models: vec!["gpt-4o".into()],
            error_message: None,
        })
    }
}

pub struct PrefixPresigner;

#[async_trait]
impl Presigner for PrefixPresigner {
    async fn presign(&self, path: &str) -> std::result::Result<String, PresignError> {
        Ok(format!("https://signed.example.com/{path}"))
    }
}

pub struct TestHarness {
    pub store: Arc<SqliteStore>,
    pub github: Arc<MockGithubClient>,
    pub agent: Arc<MockAgentClient>,
    pub pipeline: Pipeline,
    jobs: mpsc::UnboundedReceiver<Job>,
}

impl TestHarness {
    /// Teacher (id 10) with two credentials plus a super admin (id 1).
    pub async fn new() -> Self {
        let harness = Self::bare().await;
        harness
            .store
            .insert_user(&User {
                id: 1,
                email: "admin@example.com".into(),
                role: "super_admin".into(),
                github_token: Some("admin-token".into()),
            })
            .await
            .unwrap();
        for (id, status) in [(1, "active"), (2, "inactive")] {
            harness
                .store
                .insert_llm(&LlmCredential {
                    id,
                    user_id: 10,
                    provider: "openai".into(),
                    model_id: format!("model-{id}"),
                    api_key: format!("sk-{id}"),
                    status: status.into(),
                })
                .await
                .unwrap();
        }
        harness
    }

    /// Only the teacher account, no admin and no credentials.
    pub async fn bare() -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .insert_user(&User {
                id: 10,
                email: "teacher@example.com".into(),
                role: "teacher".into(),
                github_token: Some("teacher-token".into()),
            })
            .await
            .unwrap();

        let github = Arc::new(MockGithubClient::new());
        let agent = Arc::new(MockAgentClient::new());
        let (queue, jobs) = TaskQueue::channel();
        let pipeline = Pipeline::new(
            store.clone(),
            github.clone(),
            agent.clone(),
            Arc::new(PrefixPresigner),
            queue,
        );

        Self {
            store,
            github,
            agent,
            pipeline,
            jobs,
        }
    }

    /// Insert a course and one assignment for it.
    pub async fn seed_course(&self, course: Course) {
        let assignment = Assignment {
            id: course.id * 100 + 1,
            course_id: course.id,
            name: "Lab 1".into(),
            answer_path: Some("answers/lab1.md".into()),
        };
        self.store.insert_course(&course).await.unwrap();
        self.store.insert_assignment(&assignment).await.unwrap();
    }

    /// Jobs enqueued so far, in order.
    pub fn drain_jobs(&mut self) -> Vec<Job> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.jobs.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}

pub fn course_fixture(id: i64) -> Course {
    Course {
        id,
        user_id: 10,
        name: format!("Course {id}"),
        github_url: "https://github.com/octo/lab".into(),
        owner: "octo-teacher".into(),
        auto_grade: false,
        convention_path: Some("conventions/style.md".into()),
    }
}

pub fn remote_pr(number: i64) -> RemotePullRequest {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    RemotePullRequest {
        number,
        title: format!("Lab submission {number}"),
        body: Some(format!("Solution for lab {number}")),
        state: "open".into(),
        merged_at: None,
        created_at: ts,
        updated_at: ts,
        head: PrHead {
            sha: format!("sha-{number}"),
        },
    }
}
