//! Shared state for the function handlers.

use std::sync::Arc;

use axum::http::HeaderMap;

use super::error::FunctionError;
use super::store::{CareStore, Directory, SessionVerifier, VerifiedUser};

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
}

pub struct AppState {
    pub http: reqwest::Client,
    pub sessions: Arc<dyn SessionVerifier>,
    pub store: Arc<dyn CareStore>,
    pub directory: Arc<dyn Directory>,
    pub gateway: GatewayConfig,
}

/// Pull the bearer token out of the Authorization header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the caller's session or fail with 401.
pub async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<VerifiedUser, FunctionError> {
    let token = bearer_token(headers).ok_or(FunctionError::Unauthorized)?;
    state
        .sessions
        .verify(token)
        .await?
        .ok_or(FunctionError::Unauthorized)
}
