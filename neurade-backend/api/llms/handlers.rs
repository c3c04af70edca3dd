use axum::extract::State;
use axum::{Form, Json};
use serde::Deserialize;

use crate::agent::models::{ValidateKeyRequest, ValidateKeyResponse};
use crate::api::AppState;
use crate::error::{PipelineError, Result};

#[derive(Deserialize)]
pub(crate) struct ValidateKeyForm {
    #[serde(default)]
    provider: String,
    #[serde(default)]
    token: String,
}

/// POST /llms/validate-key
/// Ask the LLM service whether a provider key works and which models it unlocks.
#[tracing::instrument(skip_all)]
pub(crate) async fn validate_key(
    State(state): State<AppState>,
    Form(form): Form<ValidateKeyForm>,
) -> Result<Json<ValidateKeyResponse>> {
    let provider = form.provider.trim();
    let token = form.token.trim();
    if provider.is_empty() || token.is_empty() {
        return Err(PipelineError::validation("provider and token are required"));
    }

    let response = state
        .pipeline
        .agent
        .validate_key(&ValidateKeyRequest {
            provider: provider.to_string(),
            api_key: token.to_string(),
        })
        .await?;
    tracing::info!(provider, valid = response.is_valid, "credential validated");
    Ok(Json(response))
}
