use crate::error::{PipelineError, Result};
use crate::github::models::{ReviewEvent, ReviewSubmission};
use crate::store::{GradingStatus, ReviewResult};

use super::{course_repo, Pipeline};

impl Pipeline {
    /// Post the stored review of a PR to GitHub and mark it `Done`.
    pub async fn publish_stored_review(&self, pr_id: i64, course_id: i64) -> Result<()> {
        let pr = self.store.get_pull_request(pr_id).await?;
        let review = pr
            .result
            .ok_or_else(|| PipelineError::validation(format!("pull request {pr_id} has no review to publish")))?;
        self.publish_review(pr_id, course_id, &review, None).await
    }

    /// Store a hand-edited review and post it.
    pub async fn publish_manual_review(
        &self,
        pr_id: i64,
        course_id: i64,
        review: &ReviewResult,
    ) -> Result<()> {
        let pr = self.store.get_pull_request(pr_id).await?;
        if pr.course_id != course_id {
            return Err(PipelineError::validation(format!(
                "pull request {pr_id} does not belong to course {course_id}"
            )));
        }
        self.store.record_review(pr_id, None, review).await?;
        self.publish_review(pr_id, course_id, review, None).await
    }

    /// Post `review` as a formal `COMMENT` review on the PR, using the course
    /// owner's token, then mark the PR `Done`. The head commit is looked up
    /// when `commit_id` is not given.
    pub async fn publish_review(
        &self,
        pr_id: i64,
        course_id: i64,
        review: &ReviewResult,
        commit_id: Option<String>,
    ) -> Result<()> {
        let course = self.store.get_course(course_id).await?;
        let pr = self.store.get_pull_request(pr_id).await?;
        if pr.course_id != course.id {
            return Err(PipelineError::validation(format!(
                "pull request {pr_id} does not belong to course {course_id}"
            )));
        }
        let repo = course_repo(&course)?;
        let token = self.owner_token(&course).await?;

        let commit_id = match commit_id.filter(|c| !c.is_empty()) {
            Some(commit_id) => commit_id,
            None => {
                self.github
                    .head_commit_sha(&repo, pr.pr_number, &token)
                    .await?
            }
        };

        let submission = ReviewSubmission {
            commit_id,
            body: review.summary.clone(),
            event: ReviewEvent::Comment,
            comments: review.comments.clone(),
        };
        self.github
            .post_review(&repo, pr.pr_number, &token, &submission)
            .await?;

        self.store
            .set_grading_status(pr_id, GradingStatus::Done)
            .await?;

        tracing::info!(
            course_id,
            pr_number = pr.pr_number,
            comments = submission.comments.len(),
            "review published"
        );
        Ok(())
    }
}
