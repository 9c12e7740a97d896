//! Caller identity middleware
//!
//! Token verification lives outside this service: by the time a request
//! reaches the gateway, the fronting verifier has already authenticated it.
//! This middleware only extracts the bearer identity so handlers and logs
//! can attribute the request, and refuses requests that arrive with no
//! identity at all.

use axum::{extract::Request, http::header, middleware::Next, response::Response};
use tracing::debug;

use crate::error::AppError;

/// The already-authenticated caller of one request
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub id: String,
}

/// Extract the Authorization header and return the bearer token
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").filter(|t| !t.is_empty())
}

/// Identity extraction middleware
///
/// Adds [`CallerIdentity`] to request extensions; rejects requests without a
/// bearer Authorization header.
pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = extract_bearer_token(auth_header).ok_or(AppError::Unauthorized)?;

    let caller = CallerIdentity {
        id: token.to_string(),
    };
    debug!(caller = %caller.id, "Caller identity attached");

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
