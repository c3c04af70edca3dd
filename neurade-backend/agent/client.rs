use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ServiceEndpoints;
use crate::error::{PipelineError, Result};

use super::models::{
    AgentResponse, AutoReviewRequest, ChatRequest, ChatResponse, ReviewRequest,
    ValidateKeyRequest, ValidateKeyResponse,
};

const REVIEW_TIMEOUT: Duration = Duration::from_secs(60);
const CHAT_TIMEOUT: Duration = Duration::from_secs(60);
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Calls to the external LLM services.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> Result<AgentResponse>;
    async fn review_auto(&self, request: &AutoReviewRequest) -> Result<AgentResponse>;
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
    async fn validate_key(&self, request: &ValidateKeyRequest) -> Result<ValidateKeyResponse>;
}

pub struct HttpAgentClient {
    client: Client,
    endpoints: ServiceEndpoints,
}

impl HttpAgentClient {
    pub fn new(client: Client, endpoints: ServiceEndpoints) -> Self {
        Self { client, endpoints }
    }

    async fn post_json<B, T>(
        &self,
        service: &'static str,
        base: Option<&str>,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let base = base.ok_or_else(|| PipelineError::Transport {
            service,
            message: "endpoint not configured".into(),
        })?;

        let resp = self
            .client
            .post(format!("{base}{path}"))
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(service, e))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream {
                service,
                status: status.as_u16(),
                body,
            });
        }

        resp.json()
            .await
            .map_err(|e| PipelineError::from_reqwest(service, e))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn review(&self, request: &ReviewRequest) -> Result<AgentResponse> {
        self.post_json(
            "agent",
            self.endpoints.review.as_deref(),
            "/api/review",
            request,
            REVIEW_TIMEOUT,
        )
        .await
    }

    async fn review_auto(&self, request: &AutoReviewRequest) -> Result<AgentResponse> {
        self.post_json(
            "agent",
            self.endpoints.review.as_deref(),
            "/api/review-auto",
            request,
            REVIEW_TIMEOUT,
        )
        .await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.post_json(
            "chat",
            self.endpoints.chat.as_deref(),
            "/api/chat",
            request,
            CHAT_TIMEOUT,
        )
        .await
    }

    async fn validate_key(&self, request: &ValidateKeyRequest) -> Result<ValidateKeyResponse> {
        self.post_json(
            "llm-service",
            self.endpoints.llm_service.as_deref(),
            "/api/v1/validate-key",
            request,
            VALIDATE_TIMEOUT,
        )
        .await
    }
}
