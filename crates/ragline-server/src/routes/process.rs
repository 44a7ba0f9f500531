//! Single-shot turn endpoint

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: Option<String>,
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub response: String,
    pub status: &'static str,
}

/// `POST /api/process-prompt`
///
/// The body is parsed by hand so malformed or incomplete requests get a 400
/// with the usual error shape.
pub async fn process_prompt(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PromptResponse>, ApiError> {
    let request: PromptRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON request: {}", e)))?;

    let thread_id = request
        .thread_id
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("thread_id is required"))?;
    let prompt = request
        .prompt
        .ok_or_else(|| ApiError::bad_request("prompt is required"))?;

    let answer = state
        .context
        .orchestrator
        .run_turn(&thread_id, &prompt)
        .await?;

    Ok(Json(PromptResponse {
        response: answer.text(),
        status: "success",
    }))
}
