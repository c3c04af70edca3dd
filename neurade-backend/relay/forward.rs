use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::payload::Forward;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(15);

/// Delivers flattened webhook fields to the backend listeners.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, forward: &Forward) -> Result<()>;
}

pub struct HttpForwarder {
    client: Client,
    backend: String,
}

impl HttpForwarder {
    pub fn new(client: Client, backend: &str) -> Self {
        Self {
            client,
            backend: backend.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, forward: &Forward) -> Result<()> {
        let url = format!("{}{}", self.backend, forward.path);
        let resp = self
            .client
            .post(&url)
            .form(&forward.fields)
            .timeout(FORWARD_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("failed to reach backend at {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("backend returned {status} for {}: {body}", forward.path);
        }
        Ok(())
    }
}
