//! Unified function-server error type.
//!
//! Every handler returns `Result<T, FunctionError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body of the
//! fixed shape `{ "error": string }` with the matching HTTP status.
//!
//! Internal store errors are logged with full detail but only a generic
//! message reaches the caller, so backend URLs and row contents never
//! leak to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::store::StoreError;

#[derive(Debug, Error)]
pub enum FunctionError {
    /// No bearer token, or the token did not resolve to a session.
    #[error("missing or invalid session")]
    Unauthorized,

    /// The caller is authenticated but lacks the required role.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The model gateway rejected the request for rate reasons.
    #[error("{0}")]
    RateLimited(String),

    /// The model gateway reported exhausted credits.
    #[error("{0}")]
    CreditsExhausted(String),

    /// The model gateway failed in some other way.
    #[error("{0}")]
    Upstream(String),

    /// Propagated from the managed store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for FunctionError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            FunctionError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid session".to_owned(),
            ),
            FunctionError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            FunctionError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            FunctionError::RateLimited(m) => (StatusCode::TOO_MANY_REQUESTS, m.clone()),
            FunctionError::CreditsExhausted(m) => (StatusCode::PAYMENT_REQUIRED, m.clone()),
            FunctionError::Upstream(m) => (StatusCode::BAD_GATEWAY, m.clone()),
            FunctionError::Store(e) => {
                error!(error = %e, "store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            FunctionError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}
