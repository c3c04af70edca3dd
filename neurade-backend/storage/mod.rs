pub mod presigned;

use async_trait::async_trait;

pub use presigned::S3Presigner;

#[derive(thiserror::Error, Debug)]
pub enum PresignError {
    #[error("empty object path")]
    EmptyPath,

    #[error("object storage is not configured")]
    NotConfigured,

    #[error("invalid storage configuration: {0}")]
    Config(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Turns a stored object path into a short-lived readable URL.
#[async_trait]
pub trait Presigner: Send + Sync {
    async fn presign(&self, path: &str) -> Result<String, PresignError>;
}

/// Presign `path`, falling back to the raw path when presigning fails.
pub async fn presign_or_raw(presigner: &dyn Presigner, path: &str) -> String {
    match presigner.presign(path).await {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(path, error = %e, "presign failed, using raw path");
            path.to_string()
        }
    }
}

/// Presign an optional path; `None` and blank paths become an empty string.
pub async fn presign_optional(presigner: &dyn Presigner, path: Option<&str>) -> String {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => presign_or_raw(presigner, path).await,
        None => String::new(),
    }
}
