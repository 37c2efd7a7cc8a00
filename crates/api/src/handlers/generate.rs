//! Handler for `POST /generate`.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use comfygate_core::workflow::{resolve_seed, PromptOverrides, DEFAULT_NEGATIVE_PROMPT, RANDOM_SEED};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::BasicAuth;
use crate::state::AppState;

/// Query parameters accepted by `/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    pub positive_prompt: String,
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,
    /// `-1` picks a random seed.
    #[serde(default = "default_seed")]
    pub seed: i64,
}

fn default_negative_prompt() -> String {
    DEFAULT_NEGATIVE_PROMPT.to_string()
}

fn default_seed() -> i64 {
    RANDOM_SEED
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Image files, base64 (standard alphabet), in workflow output order.
    pub images: Vec<String>,
}

/// POST /generate?positive_prompt=..&negative_prompt=..&seed=..
///
/// Authentication is extracted first, so a rejected caller never reaches
/// ComfyUI. The job runs under a child of the shutdown token.
pub async fn generate(
    auth: BasicAuth,
    State(state): State<AppState>,
    params: Result<Query<GenerateParams>, QueryRejection>,
) -> AppResult<Json<GenerateResponse>> {
    let Query(params) = params.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let seed = resolve_seed(params.seed);
    let workflow = state.workflow.render(&PromptOverrides {
        positive_prompt: params.positive_prompt,
        negative_prompt: params.negative_prompt,
        seed,
    })?;

    tracing::info!(user = %auth.username, seed, "Submitting generation");

    let images = state
        .backend
        .generate(workflow, state.shutdown.child_token())
        .await?;

    tracing::info!(user = %auth.username, count = images.len(), "Generation complete");

    Ok(Json(GenerateResponse {
        images: images.iter().map(|bytes| BASE64.encode(bytes)).collect(),
    }))
}
