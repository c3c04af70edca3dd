pub mod chat;
pub mod grader;
pub mod publish;
pub mod routing;
pub mod sync;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use crate::agent::client::AgentClient;
use crate::error::{PipelineError, Result};
use crate::github::client::GithubClient;
use crate::github::models::RepoCoordinates;
use crate::github::repo_url::parse_repo_url;
use crate::storage::Presigner;
use crate::store::{Course, LlmCredential, Store, User};
use crate::tasks::TaskQueue;

/// Everything the review pipeline talks to. Cheap to clone; handlers and
/// background jobs each hold their own copy.
#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn Store>,
    pub github: Arc<dyn GithubClient>,
    pub agent: Arc<dyn AgentClient>,
    pub presigner: Arc<dyn Presigner>,
    pub tasks: TaskQueue,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        github: Arc<dyn GithubClient>,
        agent: Arc<dyn AgentClient>,
        presigner: Arc<dyn Presigner>,
        tasks: TaskQueue,
    ) -> Self {
        Self {
            store,
            github,
            agent,
            presigner,
            tasks,
        }
    }

    /// Pick the credential to use for `owner_id` without an explicit choice.
    pub(crate) async fn credential_for_owner(&self, owner_id: i64) -> Result<LlmCredential> {
        let llms = self.store.list_llms_by_owner(owner_id).await?;
        select_credential(&llms)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("llm credential for user", owner_id))
    }

    /// GitHub token of the course owner.
    pub(crate) async fn owner_token(&self, course: &Course) -> Result<String> {
        let owner = self.store.get_user(course.user_id).await?;
        github_token(&owner)
    }
}

/// First active credential in list order, else the first credential at all.
pub fn select_credential(llms: &[LlmCredential]) -> Option<&LlmCredential> {
    llms.iter().find(|l| l.is_active()).or_else(|| llms.first())
}

pub(crate) fn course_repo(course: &Course) -> Result<RepoCoordinates> {
    parse_repo_url(&course.github_url)
}

pub(crate) fn github_token(user: &User) -> Result<String> {
    user.github_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PipelineError::validation(format!("user {} has no GitHub token", user.id)))
}
