//! Error types for the model proxy
//!
//! Every rejection the dispatcher produces maps to one variant here, and every
//! variant renders as an explicit status with a `{"error": "..."}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Request-level errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("missing model in request body")]
    MissingModel,

    #[error("{0}")]
    BodyRead(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("too many requests")]
    TooManyRequests,

    #[error("{0}")]
    Upstream(#[from] reqwest::Error),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingModel | ProxyError::BodyRead(_) => StatusCode::BAD_REQUEST,
            ProxyError::UnknownModel(_) => StatusCode::NOT_FOUND,
            ProxyError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the `outcome` metric dimension
    pub fn outcome(&self) -> &'static str {
        match self {
            ProxyError::MissingModel | ProxyError::BodyRead(_) => "bad_request",
            ProxyError::UnknownModel(_) => "unknown_model",
            ProxyError::TooManyRequests => "rejected",
            ProxyError::Upstream(_) => "upstream_error",
            ProxyError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type ProxyResult<T> = Result<T, ProxyError>;
