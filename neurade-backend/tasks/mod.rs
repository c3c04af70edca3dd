use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::pipeline::chat::MentionJob;
use crate::pipeline::Pipeline;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Background work handed off by request handlers.
#[derive(Debug, Clone)]
pub enum Job {
    AutoGradeCourse {
        user_id: i64,
        course_id: i64,
        llm_id: i64,
    },
    PublishReview {
        pr_id: i64,
        course_id: i64,
    },
    AnswerMention(Box<MentionJob>),
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::AutoGradeCourse { .. } => "auto_grade_course",
            Job::PublishReview { .. } => "publish_review",
            Job::AnswerMention(_) => "answer_mention",
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl TaskQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand a job to the runner. Never blocks the caller.
    pub fn enqueue(&self, job: Job) {
        let kind = job.kind();
        if self.tx.send(job).is_err() {
            tracing::error!(job = kind, "task runner is gone, dropping job");
        } else {
            tracing::debug!(job = kind, "job enqueued");
        }
    }
}

/// Owns the job receiver and every in-flight job. Jobs run in their own
/// tasks, independent of the request that enqueued them.
pub struct TaskRunner {
    rx: mpsc::UnboundedReceiver<Job>,
    shutdown: watch::Receiver<bool>,
    in_flight: JoinSet<()>,
}

impl TaskRunner {
    pub fn new(rx: mpsc::UnboundedReceiver<Job>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            rx,
            shutdown,
            in_flight: JoinSet::new(),
        }
    }

    pub async fn run(mut self, pipeline: Pipeline) {
        tracing::info!("task runner started");

        loop {
            tokio::select! {
                job = self.rx.recv() => match job {
                    Some(job) => {
                        let pipeline = pipeline.clone();
                        self.in_flight.spawn(execute(pipeline, job));
                    }
                    None => break,
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "background job panicked");
                    }
                }
            }
        }

        self.drain().await;
    }

    async fn drain(&mut self) {
        let pending = self.in_flight.len();
        if pending == 0 {
            tracing::info!("task runner stopped");
            return;
        }

        tracing::info!(pending, "waiting for in-flight jobs");
        let in_flight = &mut self.in_flight;
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async move {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "background job panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = self.in_flight.len(),
                "drain timeout reached, aborting jobs"
            );
            self.in_flight.abort_all();
        }
        tracing::info!("task runner stopped");
    }
}

async fn execute(pipeline: Pipeline, job: Job) {
    let kind = job.kind();
    let outcome = match job {
        Job::AutoGradeCourse {
            user_id,
            course_id,
            llm_id,
        } => pipeline
            .auto_grade_course(user_id, course_id, llm_id)
            .await
            .map(|report| {
                tracing::info!(
                    course_id,
                    total_prs = report.total_prs,
                    processed = report.processed_prs_count,
                    "auto-grade sweep finished"
                );
            }),
        Job::PublishReview { pr_id, course_id } => {
            pipeline.publish_stored_review(pr_id, course_id).await
        }
        Job::AnswerMention(mention) => pipeline.answer_mention(*mention).await,
    };

    if let Err(e) = outcome {
        tracing::error!(job = kind, error = %e, "background job failed");
    }
}
