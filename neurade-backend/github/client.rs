use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use crate::error::{PipelineError, Result};

use super::models::{CommentTarget, RemotePullRequest, RepoCoordinates, ReviewSubmission};

const USER_AGENT: &str = "neurade-bot";
const GITHUB_API: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const SERVICE: &str = "github";

const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 10;

const LIST_TIMEOUT: Duration = Duration::from_secs(60);
const HEAD_SHA_TIMEOUT: Duration = Duration::from_secs(10);
const REVIEW_TIMEOUT: Duration = Duration::from_secs(10);
const COMMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub REST calls used by the pipeline. Every call carries the token of
/// the identity it acts for; the adapter never retries or deduplicates.
#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn list_pull_requests(
        &self,
        repo: &RepoCoordinates,
        token: &str,
    ) -> Result<Vec<RemotePullRequest>>;

    async fn head_commit_sha(
        &self,
        repo: &RepoCoordinates,
        pr_number: i64,
        token: &str,
    ) -> Result<String>;

    async fn post_review(
        &self,
        repo: &RepoCoordinates,
        pr_number: i64,
        token: &str,
        review: &ReviewSubmission,
    ) -> Result<()>;

    async fn post_comment(
        &self,
        repo: &RepoCoordinates,
        pr_number: i64,
        token: &str,
        target: &CommentTarget,
        body: &str,
    ) -> Result<()>;
}

pub struct HttpGithubClient {
    client: Client,
    api_base: String,
}

impl HttpGithubClient {
    pub fn new(client: Client) -> Self {
        Self::with_api_base(client, GITHUB_API)
    }

    pub fn with_api_base(client: Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn repo_url(&self, repo: &RepoCoordinates, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{rest}",
            self.api_base, repo.owner, repo.repo
        )
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder
            .bearer_auth(token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }
}

async fn send(builder: RequestBuilder) -> Result<reqwest::Response> {
    let resp = builder
        .send()
        .await
        .map_err(|e| PipelineError::from_reqwest(SERVICE, e))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(PipelineError::Upstream {
            service: SERVICE,
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

#[derive(Deserialize)]
struct PullHead {
    head: super::models::PrHead,
}

#[async_trait]
impl GithubClient for HttpGithubClient {
    async fn list_pull_requests(
        &self,
        repo: &RepoCoordinates,
        token: &str,
    ) -> Result<Vec<RemotePullRequest>> {
        let url = self.repo_url(repo, "pulls");
        let mut all = Vec::new();

        for page in 1..=MAX_PAGES {
            let request = self
                .client
                .get(&url)
                .query(&[
                    ("state", "all".to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .timeout(LIST_TIMEOUT);
            let resp = send(self.authorized(request, token)).await?;

            let batch: Vec<RemotePullRequest> = resp
                .json()
                .await
                .map_err(|e| PipelineError::from_reqwest(SERVICE, e))?;
            let last_page = batch.len() < PER_PAGE;
            all.extend(batch);
            if last_page {
                break;
            }
        }

        tracing::debug!(repo = %repo.full_name(), count = all.len(), "listed pull requests");
        Ok(all)
    }

    async fn head_commit_sha(
        &self,
        repo: &RepoCoordinates,
        pr_number: i64,
        token: &str,
    ) -> Result<String> {
        let url = self.repo_url(repo, &format!("pulls/{pr_number}"));
        let request = self.client.get(&url).timeout(HEAD_SHA_TIMEOUT);
        let resp = send(self.authorized(request, token)).await?;

        let pr: PullHead = resp
            .json()
            .await
            .map_err(|e| PipelineError::from_reqwest(SERVICE, e))?;
        Ok(pr.head.sha)
    }

    async fn post_review(
        &self,
        repo: &RepoCoordinates,
        pr_number: i64,
        token: &str,
        review: &ReviewSubmission,
    ) -> Result<()> {
        let url = self.repo_url(repo, &format!("pulls/{pr_number}/reviews"));
        let request = self.client.post(&url).json(review).timeout(REVIEW_TIMEOUT);
        send(self.authorized(request, token)).await?;
        Ok(())
    }

    async fn post_comment(
        &self,
        repo: &RepoCoordinates,
        pr_number: i64,
        token: &str,
        target: &CommentTarget,
        body: &str,
    ) -> Result<()> {
        let (url, payload) = match target {
            CommentTarget::ReviewReply { comment_id } => (
                self.repo_url(repo, &format!("pulls/{pr_number}/comments/{comment_id}/replies")),
                json!({ "body": body }),
            ),
            CommentTarget::Inline {
                commit_id,
                path,
                position,
                side,
            } => {
                let mut payload = json!({
                    "body": body,
                    "commit_id": commit_id,
                    "path": path,
                    "position": position,
                });
                if let Some(side) = side {
                    payload["side"] = json!(side);
                }
                (
                    self.repo_url(repo, &format!("pulls/{pr_number}/comments")),
                    payload,
                )
            }
            CommentTarget::Issue => (
                self.repo_url(repo, &format!("issues/{pr_number}/comments")),
                json!({ "body": body }),
            ),
        };

        let request = self.client.post(&url).json(&payload).timeout(COMMENT_TIMEOUT);
        send(self.authorized(request, token)).await?;
        Ok(())
    }
}
