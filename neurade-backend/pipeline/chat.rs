use crate::agent::models::ChatRequest;
use crate::error::{PipelineError, Result};
use crate::storage::presign_optional;
use crate::store::{ChatEntry, ChatRole, Course, ThreadKey, User};
use crate::tasks::Job;

use super::routing::{select_target, CommentAnchor};
use super::{course_repo, Pipeline};

const BOT_MENTION: &str = "@bot";
const TEACHER_ASSOCIATIONS: [&str; 3] = ["COLLABORATOR", "CONTRIBUTOR", "OWNER"];

/// A PR comment as delivered by the webhook relay.
#[derive(Debug, Clone)]
pub struct CommentEvent {
    pub repository_url: String,
    pub pr_number: i64,
    pub body: String,
    pub user: String,
    pub author_association: String,
    pub anchor: CommentAnchor,
}

/// Deferred bot reply for a comment that mentioned the bot. `history` is the
/// thread as it stood right after the mention was appended.
#[derive(Debug, Clone)]
pub struct MentionJob {
    pub course_id: i64,
    pub history: Vec<ChatEntry>,
    pub event: CommentEvent,
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub role: ChatRole,
    pub mentioned_bot: bool,
}

pub fn mentions_bot(body: &str) -> bool {
    body.to_lowercase().contains(BOT_MENTION)
}

fn commenter_role(user: &str, association: &str, owner: &User, course: &Course) -> ChatRole {
    let user = user.trim();
    let is_owner = !user.is_empty()
        && (user == owner.email || user.eq_ignore_ascii_case(course.owner.trim()));
    let association = association.trim().to_ascii_uppercase();
    if is_owner || TEACHER_ASSOCIATIONS.contains(&association.as_str()) {
        ChatRole::Teacher
    } else {
        ChatRole::Student
    }
}

impl Pipeline {
    /// Record a PR comment in its chat thread and, when the bot is
    /// mentioned, queue a reply.
    pub async fn ingest_comment(&self, event: CommentEvent) -> Result<IngestOutcome> {
        let course = self
            .store
            .find_course_by_repo_url(&event.repository_url)
            .await?
            .ok_or_else(|| PipelineError::not_found("course for repository", &event.repository_url))?;
        let owner = self.store.get_user(course.user_id).await?;

        let role = commenter_role(&event.user, &event.author_association, &owner, &course);
        // Commenters are not mapped to accounts; threads belong to the course owner.
        let thread = ThreadKey {
            course_id: course.id,
            user_id: course.user_id,
            pr_number: event.pr_number,
        };

        self.store
            .append_chat_message(
                thread,
                ChatEntry {
                    role,
                    message: event.body.clone(),
                },
            )
            .await?;

        let mentioned_bot = mentions_bot(&event.body);
        tracing::info!(
            course_id = course.id,
            pr_number = event.pr_number,
            role = role.as_str(),
            mentioned_bot,
            "comment ingested"
        );

        if mentioned_bot {
            let history = self.store.chat_history(thread).await?;
            self.tasks.enqueue(Job::AnswerMention(Box::new(MentionJob {
                course_id: course.id,
                history,
                event,
            })));
        }

        Ok(IngestOutcome {
            role,
            mentioned_bot,
        })
    }

    /// Ask the chat service about a mention and post the answer on GitHub.
    pub async fn answer_mention(&self, job: MentionJob) -> Result<()> {
        let course = self.store.get_course(job.course_id).await?;
        let llm = self.credential_for_owner(course.user_id).await?;

        let assignments = self.store.list_assignments(course.id).await?;
        let answer_file_path = presign_optional(
            self.presigner.as_ref(),
            assignments.first().and_then(|a| a.answer_path.as_deref()),
        )
        .await;

        let request = ChatRequest {
            api_key: llm.api_key.clone(),
            model: llm.model_id.clone(),
            query: job.event.body.clone(),
            file_queried_on: job.event.anchor.path.clone().unwrap_or_default(),
            answer_file_path,
            previous_comment: job.history,
        };
        let response = self.agent.chat(&request).await?;

        let reply = response.assistant_response.trim();
        if reply.is_empty() {
            tracing::info!(pr_number = job.event.pr_number, "chat service returned no answer");
            return Ok(());
        }

        let repo = course_repo(&course)?;
        let token = self.owner_token(&course).await?;
        let target = select_target(&job.event.anchor);
        self.github
            .post_comment(&repo, job.event.pr_number, &token, &target, reply)
            .await?;

        tracing::info!(
            course_id = course.id,
            pr_number = job.event.pr_number,
            tier = target.tier(),
            "bot reply posted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::models::CommentTarget;
    use crate::pipeline::testing::{TestHarness, course_fixture};
    use crate::store::Store;

    fn comment(body: &str, user: &str, association: &str) -> CommentEvent {
        CommentEvent {
            repository_url: "https://github.com/octo/lab".into(),
            pr_number: 4,
            body: body.into(),
            user: user.into(),
            author_association: association.into(),
            anchor: CommentAnchor::default(),
        }
    }

    async fn harness() -> TestHarness {
        let harness = TestHarness::new().await;
        harness.seed_course(course_fixture(1)).await;
        harness
    }

    fn thread() -> ThreadKey {
        ThreadKey {
            course_id: 1,
            user_id: 10,
            pr_number: 4,
        }
    }

    fn take_mention(harness: &mut TestHarness) -> MentionJob {
        let mut jobs = harness.drain_jobs();
        assert_eq!(jobs.len(), 1);
        match jobs.remove(0) {
            Job::AnswerMention(job) => *job,
            other => panic!("unexpected job: {other:?}"),
        }
    }

    #[test]
    fn mention_is_case_insensitive() {
        assert!(mentions_bot("hey @BOT what is wrong?"));
        assert!(mentions_bot("@bot"));
        assert!(!mentions_bot("robot says hi"));
    }

    #[tokio::test]
    async fn every_comment_is_appended() {
        let mut harness = harness().await;
        harness
            .pipeline
            .ingest_comment(comment("first", "student1", "NONE"))
            .await
            .unwrap();
        let outcome = harness
            .pipeline
            .ingest_comment(comment("second @bot", "student1", "NONE"))
            .await
            .unwrap();

        assert!(outcome.mentioned_bot);
        let history = harness.store.chat_history(thread()).await.unwrap();
        let messages: Vec<&str> = history.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second @bot"]);
        assert_eq!(harness.drain_jobs().len(), 1);
    }

    #[tokio::test]
    async fn roles_follow_owner_and_association() {
        let harness = harness().await;
        let cases = [
            ("teacher@example.com", "NONE", ChatRole::Teacher),
            ("Octo-Teacher", "NONE", ChatRole::Teacher),
            ("someone", "collaborator", ChatRole::Teacher),
            ("someone", "OWNER", ChatRole::Teacher),
            ("someone", "CONTRIBUTOR", ChatRole::Teacher),
            ("someone", "FIRST_TIME_CONTRIBUTOR", ChatRole::Student),
            ("someone", "", ChatRole::Student),
        ];
        for (user, association, expected) in cases {
            let outcome = harness
                .pipeline
                .ingest_comment(comment("hi", user, association))
                .await
                .unwrap();
            assert_eq!(outcome.role, expected, "{user}/{association}");
        }
    }

    #[tokio::test]
    async fn unknown_repository_is_not_found() {
        let harness = harness().await;
        let mut event = comment("hi", "u", "NONE");
        event.repository_url = "https://github.com/nobody/nothing".into();
        let err = harness.pipeline.ingest_comment(event).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn mention_reply_uses_history_and_issue_tier() {
        let mut harness = harness().await;
        harness
            .pipeline
            .ingest_comment(comment("why does this fail?", "student1", "NONE"))
            .await
            .unwrap();
        harness
            .pipeline
            .ingest_comment(comment("@bot please explain", "student1", "NONE"))
            .await
            .unwrap();
        let job = take_mention(&mut harness);

        harness.pipeline.answer_mention(job).await.unwrap();

        let requests = harness.agent.chat_requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.query, "@bot please explain");
        assert_eq!(req.api_key, "sk-1");
        assert_eq!(req.previous_comment.len(), 2);
        assert_eq!(req.answer_file_path, "https://signed.example.com/answers/lab1.md");
        drop(requests);

        let posted = harness.github.comments_posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, 4);
        assert_eq!(posted[0].1, CommentTarget::Issue);
        assert_eq!(posted[0].2, "Try borrowing instead of cloning.");
    }

    #[tokio::test]
    async fn later_comments_are_not_in_mention_history() {
        let mut harness = harness().await;
        harness
            .pipeline
            .ingest_comment(comment("@bot what now?", "student1", "NONE"))
            .await
            .unwrap();
        harness
            .pipeline
            .ingest_comment(comment("never mind, fixed it", "student1", "NONE"))
            .await
            .unwrap();
        let job = take_mention(&mut harness);

        harness.pipeline.answer_mention(job).await.unwrap();

        let requests = harness.agent.chat_requests.lock().unwrap();
        let messages: Vec<&str> = requests[0]
            .previous_comment
            .iter()
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(messages, vec!["@bot what now?"]);
        drop(requests);
        assert_eq!(harness.store.chat_history(thread()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn review_comment_mention_replies_in_thread() {
        let mut harness = harness().await;
        let mut event = comment("@bot is this ok?", "student1", "NONE");
        event.anchor = CommentAnchor {
            comment_id: Some(555),
            commit_id: Some("abc".into()),
            path: Some("src/lib.rs".into()),
            position: Some(3),
            side: Some("RIGHT".into()),
        };
        harness.pipeline.ingest_comment(event).await.unwrap();
        let job = take_mention(&mut harness);

        harness.pipeline.answer_mention(job).await.unwrap();

        assert_eq!(
            harness.agent.chat_requests.lock().unwrap()[0].file_queried_on,
            "src/lib.rs"
        );
        assert_eq!(
            harness.github.comments_posted.lock().unwrap()[0].1,
            CommentTarget::ReviewReply { comment_id: 555 }
        );
    }

    #[tokio::test]
    async fn empty_answer_posts_nothing() {
        let mut harness = harness().await;
        *harness.agent.chat_reply.lock().unwrap() = "   ".into();
        harness
            .pipeline
            .ingest_comment(comment("@bot ?", "student1", "NONE"))
            .await
            .unwrap();
        let job = take_mention(&mut harness);

        harness.pipeline.answer_mention(job).await.unwrap();
        assert!(harness.github.comments_posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mention_without_credentials_fails() {
        let mut harness = TestHarness::bare().await;
        harness.seed_course(course_fixture(1)).await;
        harness
            .pipeline
            .ingest_comment(comment("@bot help", "student1", "NONE"))
            .await
            .unwrap();
        let job = take_mention(&mut harness);

        let err = harness.pipeline.answer_mention(job).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
        assert!(harness.github.comments_posted.lock().unwrap().is_empty());
    }
}
