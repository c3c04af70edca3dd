use std::collections::BTreeMap;

use serde::Serialize;

use crate::agent::models::{AgentResponse, AutoReviewRequest, ReviewRequest, MANUAL_REVIEW_QUERY};
use crate::error::{PipelineError, Result};
use crate::storage::presign_optional;
use crate::store::PullRequestRecord;
use crate::tasks::Job;

use super::{course_repo, github_token, Pipeline};

/// Result of an auto-grade sweep over a course.
#[derive(Debug, Serialize)]
pub struct AutoGradeReport {
    pub processed_prs_count: usize,
    pub total_assignments: usize,
    pub total_prs: usize,
    pub results: Vec<PrOutcome>,
}

/// Result of a manual review over explicit PR ids.
#[derive(Debug, Serialize)]
pub struct ReviewReport {
    pub processed_prs_count: usize,
    pub results: Vec<PrOutcome>,
}

#[derive(Debug, Serialize)]
pub struct PrOutcome {
    pub pr_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<i64>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Skipped { reason: String },
    Failed { error: String },
    Reviewed { response: AgentResponse },
}

impl PrOutcome {
    fn failed(pr_id: i64, pr_number: Option<i64>, err: &PipelineError) -> Self {
        Self {
            pr_id,
            pr_number,
            outcome: Outcome::Failed {
                error: err.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

impl Pipeline {
    /// Review every not-yet-graded pull request of a course. PRs are handled
    /// one at a time; a failure on one PR is recorded and the sweep goes on.
    pub async fn auto_grade_course(
        &self,
        user_id: i64,
        course_id: i64,
        llm_id: i64,
    ) -> Result<AutoGradeReport> {
        let user = self.store.get_user(user_id).await?;
        let token = github_token(&user)?;
        let llm = self.store.get_llm(llm_id).await?;
        let course = self.store.get_course(course_id).await?;
        let repo = course_repo(&course)?;
        let assignments = self.store.list_assignments(course_id).await?;
        let prs = self.store.list_pull_requests(course_id).await?;

        let convention_url =
            presign_optional(self.presigner.as_ref(), course.convention_path.as_deref()).await;

        let mut answer_file_paths = BTreeMap::new();
        for assignment in &assignments {
            let url =
                presign_optional(self.presigner.as_ref(), assignment.answer_path.as_deref()).await;
            if !url.is_empty() {
                answer_file_paths.insert(assignment.name.clone(), url);
            }
        }

        tracing::info!(
            course_id,
            total_prs = prs.len(),
            total_assignments = assignments.len(),
            model = %llm.model_id,
            "auto-grade sweep started"
        );

        let mut results = Vec::with_capacity(prs.len());
        for pr in &prs {
            if pr.is_processed() {
                tracing::debug!(course_id, pr_number = pr.pr_number, "already graded, skipping");
                results.push(PrOutcome {
                    pr_id: pr.id,
                    pr_number: Some(pr.pr_number),
                    outcome: Outcome::Skipped {
                        reason: format!("already {}", pr.grading_status.as_str()),
                    },
                });
                continue;
            }

            let request = AutoReviewRequest {
                github_token: token.clone(),
                api_key: llm.api_key.clone(),
                repo_owner: repo.owner.clone(),
                repo_name: repo.repo.clone(),
                pr_description: pr.pr_description.clone(),
                pr_number: pr.pr_number,
                answer_file_paths: answer_file_paths.clone(),
                coding_convention_path: convention_url.clone(),
                model: llm.model_id.clone(),
            };

            results.push(self.grade_one(pr, &request).await);
        }

        let failed = results.iter().filter(|r| r.is_failure()).count();
        tracing::info!(course_id, reviewed = results.len() - failed, failed, "auto-grade sweep done");

        Ok(AutoGradeReport {
            processed_prs_count: results.len(),
            total_assignments: assignments.len(),
            total_prs: prs.len(),
            results,
        })
    }

    async fn grade_one(&self, pr: &PullRequestRecord, request: &AutoReviewRequest) -> PrOutcome {
        let response = match self.agent.review_auto(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(pr_number = pr.pr_number, error = %e, "agent review failed");
                return PrOutcome::failed(pr.id, Some(pr.pr_number), &e);
            }
        };

        if let Err(e) = self
            .store
            .record_review(pr.id, None, &response.to_result())
            .await
        {
            tracing::error!(pr_number = pr.pr_number, error = %e, "failed to store review result");
            return PrOutcome::failed(pr.id, Some(pr.pr_number), &e);
        }

        self.tasks.enqueue(Job::PublishReview {
            pr_id: pr.id,
            course_id: pr.course_id,
        });

        PrOutcome {
            pr_id: pr.id,
            pr_number: Some(pr.pr_number),
            outcome: Outcome::Reviewed { response },
        }
    }

    /// Review explicit PRs against one assignment. Existing results are
    /// always overwritten.
    pub async fn review_single_pr(
        &self,
        user_id: i64,
        course_id: i64,
        llm_id: i64,
        assignment_id: i64,
        pr_ids: &[i64],
    ) -> Result<ReviewReport> {
        let user = self.store.get_user(user_id).await?;
        let token = github_token(&user)?;
        let llm = self.store.get_llm(llm_id).await?;
        let course = self.store.get_course(course_id).await?;
        let assignment = self.store.get_assignment(assignment_id).await?;
        let repo = course_repo(&course)?;

        let answer_url =
            presign_optional(self.presigner.as_ref(), assignment.answer_path.as_deref()).await;
        let convention_url =
            presign_optional(self.presigner.as_ref(), course.convention_path.as_deref()).await;

        let mut results = Vec::with_capacity(pr_ids.len());
        for &pr_id in pr_ids {
            let pr = match self.store.get_pull_request(pr_id).await {
                Ok(pr) if pr.course_id == course_id => pr,
                Ok(pr) => {
                    let err = PipelineError::validation(format!(
                        "pull request {pr_id} belongs to course {}",
                        pr.course_id
                    ));
                    results.push(PrOutcome::failed(pr_id, Some(pr.pr_number), &err));
                    continue;
                }
                Err(e) => {
                    results.push(PrOutcome::failed(pr_id, None, &e));
                    continue;
                }
            };

            let request = ReviewRequest {
                github_token: token.clone(),
                api_key: llm.api_key.clone(),
                query: MANUAL_REVIEW_QUERY.to_string(),
                repo_owner: repo.owner.clone(),
                repo_name: repo.repo.clone(),
                pr_number: pr.pr_number,
                answer_file_path: answer_url.clone(),
                coding_convention_path: convention_url.clone(),
                model: llm.model_id.clone(),
            };

            let outcome = match self.agent.review(&request).await {
                Ok(response) => match self
                    .store
                    .record_review(pr.id, Some(assignment_id), &response.to_result())
                    .await
                {
                    Ok(()) => PrOutcome {
                        pr_id,
                        pr_number: Some(pr.pr_number),
                        outcome: Outcome::Reviewed { response },
                    },
                    Err(e) => PrOutcome::failed(pr_id, Some(pr.pr_number), &e),
                },
                Err(e) => {
                    tracing::warn!(pr_number = pr.pr_number, error = %e, "agent review failed");
                    PrOutcome::failed(pr_id, Some(pr.pr_number), &e)
                }
            };
            results.push(outcome);
        }

        Ok(ReviewReport {
            processed_prs_count: results.len(),
            results,
        })
    }
}
