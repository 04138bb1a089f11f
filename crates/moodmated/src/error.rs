//! HTTP error responses.
//!
//! Every failure is rendered as `{"error": "<message>"}`.

use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;

/// Message returned for 500s when internal error text is redacted.
pub const REDACTED_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Request has no usable `image` field (400)
    #[error("No image provided")]
    MissingImage,

    /// Body exceeds the configured limit (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Body is not a JSON object, or `image` is not a string (500)
    #[error("{0}")]
    InvalidRequest(String),

    /// Decode, classify, or recommend failure (500)
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingImage => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::InvalidRequest(_) | ApiError::Engine(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Replace server-side error text with a generic message. Client errors pass through.
    pub fn redacted(self) -> Self {
        if self.status().is_server_error() {
            ApiError::Internal(REDACTED_MESSAGE.to_string())
        } else {
            self
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::InvalidRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
