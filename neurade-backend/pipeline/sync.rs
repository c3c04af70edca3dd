use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::github::models::{PrLifecycle, RemotePullRequest};
use crate::store::{Course, PullRequestUpsert, UpsertOutcome};
use crate::tasks::Job;

use super::{course_repo, select_credential, Pipeline};

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub message: String,
    pub course_id: i64,
    pub pull_requests_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SyncFailure>,
}

#[derive(Debug, Serialize)]
pub struct SyncFailure {
    pub pr_number: i64,
    pub error: String,
}

/// A single pull request as delivered by the webhook relay.
#[derive(Debug, Clone)]
pub struct PullRequestEvent {
    pub repo_url: String,
    pub pr_number: i64,
    pub pr_name: String,
    pub pr_description: String,
    pub status: PrLifecycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn upsert_from_remote(course_id: i64, pr: &RemotePullRequest) -> PullRequestUpsert {
    PullRequestUpsert {
        course_id,
        pr_number: pr.number,
        pr_name: pr.title.clone(),
        pr_description: pr.body.clone().unwrap_or_default(),
        status: pr.lifecycle(),
        created_at: pr.created_at,
        updated_at: pr.updated_at,
    }
}

impl Pipeline {
    /// Reconcile every GitHub pull request of a course into the store.
    pub async fn sync_pull_requests(&self, course_id: i64) -> Result<SyncReport> {
        let course = self.store.get_course(course_id).await?;
        let repo = course_repo(&course)?;
        let token = self
            .store
            .find_super_admin_token()
            .await?
            .ok_or_else(|| PipelineError::not_found("super admin with GitHub token", "any"))?;

        let remote = self.github.list_pull_requests(&repo, &token).await?;

        let mut report = SyncReport {
            message: "Pull requests fetched and saved successfully".to_string(),
            course_id,
            pull_requests_count: 0,
            failures: Vec::new(),
        };

        for pr in &remote {
            match self
                .store
                .upsert_pull_request(upsert_from_remote(course_id, pr))
                .await
            {
                Ok(outcome) => {
                    report.pull_requests_count += 1;
                    tracing::debug!(
                        course_id,
                        pr_number = pr.number,
                        created = outcome.created,
                        "pull request synced"
                    );
                }
                Err(e) => {
                    tracing::warn!(course_id, pr_number = pr.number, error = %e, "failed to sync pull request");
                    report.failures.push(SyncFailure {
                        pr_number: pr.number,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            course_id,
            repo = %repo.full_name(),
            synced = report.pull_requests_count,
            failed = report.failures.len(),
            "pull request sync finished"
        );

        self.schedule_auto_grade(&course).await;
        Ok(report)
    }

    /// Create or update one pull request reported by the webhook relay.
    pub async fn handle_pull_request_event(&self, event: PullRequestEvent) -> Result<UpsertOutcome> {
        let course = self
            .store
            .find_course_by_repo_url(&event.repo_url)
            .await?
            .ok_or_else(|| PipelineError::not_found("course for repository", &event.repo_url))?;

        let outcome = self
            .store
            .upsert_pull_request(PullRequestUpsert {
                course_id: course.id,
                pr_number: event.pr_number,
                pr_name: event.pr_name,
                pr_description: event.pr_description,
                status: event.status,
                created_at: event.created_at,
                updated_at: event.updated_at,
            })
            .await?;

        tracing::info!(
            course_id = course.id,
            pr_number = event.pr_number,
            created = outcome.created,
            "pull request event stored"
        );

        self.schedule_auto_grade(&course).await;
        Ok(outcome)
    }

    async fn schedule_auto_grade(&self, course: &Course) {
        if !course.auto_grade {
            return;
        }

        let llms = match self.store.list_llms_by_owner(course.user_id).await {
            Ok(llms) => llms,
            Err(e) => {
                tracing::error!(course_id = course.id, error = %e, "failed to load credentials for auto-grade");
                return;
            }
        };
        let Some(llm) = select_credential(&llms) else {
            tracing::warn!(course_id = course.id, "auto-grade enabled but course owner has no LLM credential");
            return;
        };

        self.tasks.enqueue(Job::AutoGradeCourse {
            user_id: course.user_id,
            course_id: course.id,
            llm_id: llm.id,
        });
    }
}
