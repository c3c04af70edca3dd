use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{PipelineError, Result};
use crate::github::models::PrLifecycle;
use crate::github::repo_url::comparison_key;

use super::{
    Assignment, ChatEntry, ChatRole, Course, GradingStatus, LlmCredential, PullRequestRecord,
    PullRequestUpsert, ReviewResult, Store, ThreadKey, UpsertOutcome, User,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY,
    email         TEXT NOT NULL,
    role          TEXT NOT NULL,
    github_token  TEXT
);

CREATE TABLE IF NOT EXISTS courses (
    id               INTEGER PRIMARY KEY,
    user_id          INTEGER NOT NULL,
    name             TEXT NOT NULL,
    github_url       TEXT NOT NULL,
    repo_key         TEXT NOT NULL,
    owner            TEXT NOT NULL DEFAULT '',
    auto_grade       INTEGER NOT NULL DEFAULT 0,
    convention_path  TEXT
);
CREATE INDEX IF NOT EXISTS idx_courses_repo_key ON courses(repo_key);

CREATE TABLE IF NOT EXISTS assignments (
    id           INTEGER PRIMARY KEY,
    course_id    INTEGER NOT NULL,
    name         TEXT NOT NULL,
    answer_path  TEXT
);

CREATE TABLE IF NOT EXISTS llms (
    id        INTEGER PRIMARY KEY,
    user_id   INTEGER NOT NULL,
    provider  TEXT NOT NULL DEFAULT '',
    model_id  TEXT NOT NULL,
    api_key   TEXT NOT NULL,
    status    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pull_requests (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id       INTEGER NOT NULL,
    assignment_id   INTEGER,
    pr_number       INTEGER NOT NULL,
    pr_name         TEXT NOT NULL,
    pr_description  TEXT NOT NULL DEFAULT '',
    status          TEXT NOT NULL,
    grading_status  TEXT NOT NULL DEFAULT 'Not Graded',
    result          TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE(course_id, pr_number)
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id  INTEGER NOT NULL,
    user_id    INTEGER NOT NULL,
    pr_number  INTEGER NOT NULL,
    role       TEXT NOT NULL,
    message    TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chat_thread ON chat_messages(course_id, user_id, pr_number, id);
";

const PR_COLUMNS: &str = "id, course_id, assignment_id, pr_number, pr_name, pr_description, \
     status, grading_status, result, created_at, updated_at";

/// SQLite-backed [`Store`].
///
/// rusqlite is synchronous, so every call runs on the blocking pool behind a
/// shared connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PipelineError::Persistence(format!(
                        "create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| PipelineError::Persistence("connection mutex poisoned".into()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| PipelineError::Persistence(format!("blocking task failed: {e}")))?
    }
}

impl ToSql for GradingStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for GradingStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        GradingStatus::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown grading status {s:?}").into()))
    }
}

impl ToSql for PrLifecycle {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PrLifecycle {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(PrLifecycle::from_github(value.as_str()?, false))
    }
}

impl ToSql for ChatRole {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ChatRole {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ChatRole::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown chat role {s:?}").into()))
    }
}

fn pr_from_row(row: &Row<'_>) -> rusqlite::Result<PullRequestRecord> {
    let result: Option<String> = row.get(8)?;
    let result = result
        .filter(|json| !json.is_empty())
        .map(|json| serde_json::from_str::<ReviewResult>(&json))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(PullRequestRecord {
        id: row.get(0)?,
        course_id: row.get(1)?,
        assignment_id: row.get(2)?,
        pr_number: row.get(3)?,
        pr_name: row.get(4)?,
        pr_description: row.get(5)?,
        status: row.get(6)?,
        grading_status: row.get(7)?,
        result,
        created_at: row.get::<_, DateTime<Utc>>(9)?,
        updated_at: row.get::<_, DateTime<Utc>>(10)?,
    })
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        github_url: row.get(3)?,
        owner: row.get(4)?,
        auto_grade: row.get(5)?,
        convention_path: row.get(6)?,
    })
}

fn llm_from_row(row: &Row<'_>) -> rusqlite::Result<LlmCredential> {
    Ok(LlmCredential {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        model_id: row.get(3)?,
        api_key: row.get(4)?,
        status: row.get(5)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: row.get(0)?,
        course_id: row.get(1)?,
        name: row.get(2)?,
        answer_path: row.get(3)?,
    })
}

const COURSE_COLUMNS: &str = "id, user_id, name, github_url, owner, auto_grade, convention_path";
const LLM_COLUMNS: &str = "id, user_id, provider, model_id, api_key, status";

fn select_pr(conn: &Connection, id: i64) -> Result<PullRequestRecord> {
    conn.query_row(
        &format!("SELECT {PR_COLUMNS} FROM pull_requests WHERE id = ?1"),
        params![id],
        pr_from_row,
    )
    .optional()?
    .ok_or_else(|| PipelineError::not_found("pull request", id))
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_user(&self, id: i64) -> Result<User> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, email, role, github_token FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        role: row.get(2)?,
                        github_token: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| PipelineError::not_found("user", id))
        })
        .await
    }

    async fn find_super_admin_token(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let token = conn
                .query_row(
                    "SELECT github_token FROM users
                     WHERE role = 'super_admin' AND github_token IS NOT NULL AND github_token != ''
                     ORDER BY id LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(token)
        })
        .await
    }

    async fn get_course(&self, id: i64) -> Result<Course> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"),
                params![id],
                course_from_row,
            )
            .optional()?
            .ok_or_else(|| PipelineError::not_found("course", id))
        })
        .await
    }

    async fn find_course_by_repo_url(&self, repo_url: &str) -> Result<Option<Course>> {
        let key = comparison_key(repo_url);
        self.with_conn(move |conn| {
            let course = conn
                .query_row(
                    &format!(
                        "SELECT {COURSE_COLUMNS} FROM courses WHERE repo_key = ?1 ORDER BY id LIMIT 1"
                    ),
                    params![key],
                    course_from_row,
                )
                .optional()?;
            Ok(course)
        })
        .await
    }

    async fn list_assignments(&self, course_id: i64) -> Result<Vec<Assignment>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, course_id, name, answer_path FROM assignments
                 WHERE course_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![course_id], assignment_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get_assignment(&self, id: i64) -> Result<Assignment> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, course_id, name, answer_path FROM assignments WHERE id = ?1",
                params![id],
                assignment_from_row,
            )
            .optional()?
            .ok_or_else(|| PipelineError::not_found("assignment", id))
        })
        .await
    }

    async fn get_llm(&self, id: i64) -> Result<LlmCredential> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {LLM_COLUMNS} FROM llms WHERE id = ?1"),
                params![id],
                llm_from_row,
            )
            .optional()?
            .ok_or_else(|| PipelineError::not_found("llm", id))
        })
        .await
    }

    async fn list_llms_by_owner(&self, user_id: i64) -> Result<Vec<LlmCredential>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LLM_COLUMNS} FROM llms WHERE user_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map(params![user_id], llm_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn upsert_pull_request(&self, pr: PullRequestUpsert) -> Result<UpsertOutcome> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO pull_requests
                    (course_id, pr_number, pr_name, pr_description, status, grading_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    pr.course_id,
                    pr.pr_number,
                    pr.pr_name,
                    pr.pr_description,
                    pr.status,
                    GradingStatus::NotGraded,
                    pr.created_at,
                    pr.updated_at,
                ],
            )?;

            if inserted == 0 {
                tx.execute(
                    "UPDATE pull_requests
                     SET pr_name = ?3, pr_description = ?4, status = ?5, created_at = ?6, updated_at = ?7
                     WHERE course_id = ?1 AND pr_number = ?2",
                    params![
                        pr.course_id,
                        pr.pr_number,
                        pr.pr_name,
                        pr.pr_description,
                        pr.status,
                        pr.created_at,
                        pr.updated_at,
                    ],
                )?;
            }

            let record = tx.query_row(
                &format!(
                    "SELECT {PR_COLUMNS} FROM pull_requests WHERE course_id = ?1 AND pr_number = ?2"
                ),
                params![pr.course_id, pr.pr_number],
                pr_from_row,
            )?;
            tx.commit()?;

            Ok(UpsertOutcome {
                record,
                created: inserted == 1,
            })
        })
        .await
    }

    async fn get_pull_request(&self, id: i64) -> Result<PullRequestRecord> {
        self.with_conn(move |conn| select_pr(conn, id)).await
    }

    async fn list_pull_requests(&self, course_id: i64) -> Result<Vec<PullRequestRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PR_COLUMNS} FROM pull_requests WHERE course_id = ?1 ORDER BY pr_number"
            ))?;
            let rows = stmt
                .query_map(params![course_id], pr_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn record_review(
        &self,
        pr_id: i64,
        assignment_id: Option<i64>,
        result: &ReviewResult,
    ) -> Result<()> {
        let json = serde_json::to_string(result)?;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE pull_requests
                 SET result = ?2, grading_status = ?3, assignment_id = COALESCE(?4, assignment_id)
                 WHERE id = ?1",
                params![pr_id, json, GradingStatus::Graded, assignment_id],
            )?;
            if changed == 0 {
                return Err(PipelineError::not_found("pull request", pr_id));
            }
            Ok(())
        })
        .await
    }

    async fn set_grading_status(&self, pr_id: i64, status: GradingStatus) -> Result<()> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE pull_requests SET grading_status = ?2 WHERE id = ?1",
                params![pr_id, status],
            )?;
            if changed == 0 {
                return Err(PipelineError::not_found("pull request", pr_id));
            }
            Ok(())
        })
        .await
    }

    async fn append_chat_message(&self, thread: ThreadKey, entry: ChatEntry) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO chat_messages (course_id, user_id, pr_number, role, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    thread.course_id,
                    thread.user_id,
                    thread.pr_number,
                    entry.role,
                    entry.message,
                    Utc::now(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn chat_history(&self, thread: ThreadKey) -> Result<Vec<ChatEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, message FROM chat_messages
                 WHERE course_id = ?1 AND user_id = ?2 AND pr_number = ?3
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(
                    params![thread.course_id, thread.user_id, thread.pr_number],
                    |row| {
                        Ok(ChatEntry {
                            role: row.get(0)?,
                            message: row.get(1)?,
                        })
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO users (id, email, role, github_token) VALUES (?1, ?2, ?3, ?4)",
                params![user.id, user.email, user.role, user.github_token],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_course(&self, course: &Course) -> Result<()> {
        let course = course.clone();
        let repo_key = comparison_key(&course.github_url);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO courses
                    (id, user_id, name, github_url, repo_key, owner, auto_grade, convention_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    course.id,
                    course.user_id,
                    course.name,
                    course.github_url,
                    repo_key,
                    course.owner,
                    course.auto_grade,
                    course.convention_path,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()> {
        let assignment = assignment.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO assignments (id, course_id, name, answer_path)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    assignment.id,
                    assignment.course_id,
                    assignment.name,
                    assignment.answer_path,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_llm(&self, llm: &LlmCredential) -> Result<()> {
        let llm = llm.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO llms (id, user_id, provider, model_id, api_key, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    llm.id,
                    llm.user_id,
                    llm.provider,
                    llm.model_id,
                    llm.api_key,
                    llm.status,
                ],
            )?;
            Ok(())
        })
        .await
    }
}
