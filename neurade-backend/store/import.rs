use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{Assignment, Course, LlmCredential, Store, User};

/// Bootstrap data for the entities the pipeline reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub users: Vec<User>,
    pub courses: Vec<Course>,
    pub assignments: Vec<Assignment>,
    pub llms: Vec<LlmCredential>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub users: usize,
    pub courses: usize,
    pub assignments: usize,
    pub llms: usize,
}

pub async fn import_file(path: &Path, store: &dyn Store) -> Result<ImportSummary> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let fixture: Fixture = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    import_fixture(&fixture, store).await
}

pub async fn import_fixture(fixture: &Fixture, store: &dyn Store) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for user in &fixture.users {
        store.insert_user(user).await?;
        summary.users += 1;
    }
    for course in &fixture.courses {
        if let Err(e) = crate::github::repo_url::parse_repo_url(&course.github_url) {
            tracing::warn!(course_id = course.id, error = %e, "course repository URL does not parse");
        }
        store.insert_course(course).await?;
        summary.courses += 1;
    }
    for assignment in &fixture.assignments {
        store.insert_assignment(assignment).await?;
        summary.assignments += 1;
    }
    for llm in &fixture.llms {
        store.insert_llm(llm).await?;
        summary.llms += 1;
    }

    tracing::info!(
        users = summary.users,
        courses = summary.courses,
        assignments = summary.assignments,
        llms = summary.llms,
        "Imported fixture"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    const FIXTURE: &str = r#"{
        "users": [
            {"id": 1, "email": "admin@example.com", "role": "super_admin", "github_token": "gh-admin"},
            {"id": 2, "email": "teacher@example.com", "role": "teacher", "github_token": "gh-teacher"}
        ],
        "courses": [
            {"id": 1, "user_id": 2, "name": "Systems", "github_url": "https://github.com/octo/lab",
             "owner": "octo", "auto_grade": true, "convention_path": "conventions/rust.md"}
        ],
        "assignments": [
            {"id": 1, "course_id": 1, "name": "Lab 1", "answer_path": "answers/lab1.md"}
        ],
        "llms": [
            {"id": 1, "user_id": 2, "provider": "openai", "model_id": "gpt-4o", "api_key": "sk-1", "status": "active"}
        ]
    }"#;

    #[tokio::test]
    async fn imports_every_entity_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        std::fs::write(&path, FIXTURE).unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let summary = import_file(&path, &store).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                users: 2,
                courses: 1,
                assignments: 1,
                llms: 1
            }
        );

        let course = store.get_course(1).await.unwrap();
        assert!(course.auto_grade);
        assert_eq!(
            store.find_super_admin_token().await.unwrap().as_deref(),
            Some("gh-admin")
        );
        assert_eq!(store.get_llm(1).await.unwrap().api_key, "sk-1");
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        import_fixture(&fixture, &store).await.unwrap();
        import_fixture(&fixture, &store).await.unwrap();
        assert_eq!(store.list_assignments(1).await.unwrap().len(), 1);
        assert_eq!(store.list_llms_by_owner(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = import_file(Path::new("/nonexistent/fixture.json"), &store)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
