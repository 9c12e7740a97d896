//! Chat completions endpoint
//!
//! Parses and validates the caller's provider-agnostic request, then hands it
//! to the gateway session. Validation failures happen before any stream is
//! opened and surface as plain HTTP errors; everything after that point
//! speaks the SSE protocol.

use std::sync::Arc;

use axum::{extract::State, response::Response};
use tracing::{info, warn};

use crate::{
    error::AppError,
    gateway,
    middleware::auth::CallerIdentity,
    types::ChatRequest,
    AppState,
};

/// Handle `POST /v1/chat/completions`
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    request: axum::extract::Request,
) -> Result<Response, AppError> {
    let caller = request
        .extensions()
        .get::<CallerIdentity>()
        .cloned()
        .ok_or_else(|| {
            warn!("CallerIdentity not found in request extensions");
            AppError::Unauthorized
        })?;

    // Parse the body by hand so an unknown role or missing field comes back
    // as a clean 400 instead of a framework rejection.
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to read request body: {}", e)))?;

    let chat_request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;

    chat_request.validate().map_err(AppError::BadRequest)?;

    info!(
        model = %chat_request.model,
        messages = chat_request.messages.len(),
        "Processing chat request"
    );

    gateway::relay_chat(state, caller, chat_request).await
}
