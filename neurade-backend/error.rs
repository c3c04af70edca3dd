/// Errors surfaced by the review pipeline.
///
/// Validation and not-found errors go straight back to the caller of the
/// triggering endpoint. Upstream and transport errors inside a batch become
/// per-item entries in the batch report; inside background jobs they are
/// only logged.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("transport error talking to {service}: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("persistence: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PipelineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classify a reqwest failure for `service`. Timeouts and connection
    /// failures are transport errors; everything else reqwest reports
    /// (decode failures included) is attributed to the upstream.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return PipelineError::Upstream {
                service,
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            return PipelineError::Upstream {
                service,
                status: 200,
                body: format!("undecodable response: {err}"),
            };
        }
        PipelineError::Transport {
            service,
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Persistence(format!("serialization: {err}"))
    }
}
