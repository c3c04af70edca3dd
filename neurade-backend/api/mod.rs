pub mod agent;
pub mod chats;
pub mod listen;
pub mod llms;
pub mod middleware;
pub mod pull_requests;
mod routes;
pub mod webhooks;

use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use hyper::StatusCode;
use serde_json::json;

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match &self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound { .. } => StatusCode::NOT_FOUND,
            PipelineError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Transport { .. } => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Parse a required integer form field.
pub(crate) fn required_id(field: &str, value: &str) -> Result<i64> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PipelineError::validation(format!("{field} is required")));
    }
    value
        .parse()
        .map_err(|_| PipelineError::validation(format!("{field} must be an integer, got {value:?}")))
}

/// Parse a comma-separated list of ids. Blank entries are skipped.
pub(crate) fn id_list(field: &str, value: &str) -> Result<Vec<i64>> {
    let ids = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| required_id(field, s))
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(PipelineError::validation(format!("{field} is required")));
    }
    Ok(ids)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        let cases = [
            (PipelineError::validation("x"), StatusCode::BAD_REQUEST),
            (PipelineError::not_found("course", 1), StatusCode::NOT_FOUND),
            (
                PipelineError::Upstream {
                    service: "github",
                    status: 500,
                    body: String::new(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::Transport {
                    service: "agent",
                    message: "timed out".into(),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                PipelineError::Persistence("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn id_parsing() {
        assert_eq!(required_id("course_id", " 42 ").unwrap(), 42);
        assert!(required_id("course_id", "").is_err());
        assert!(required_id("course_id", "abc").is_err());
        assert_eq!(id_list("pr_ids", "1, 2,,3").unwrap(), vec![1, 2, 3]);
        assert!(id_list("pr_ids", " , ").is_err());
        assert!(id_list("pr_ids", "1,x").is_err());
    }
}
