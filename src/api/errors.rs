//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use super::middleware::RequestId;
use crate::errors::{FailureKind, RaspadinhaError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, INSUFFICIENT_FUNDS, INTERNAL_ERROR, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    InternalError(String),
    /// Classified failure raised by the platform core
    Domain(FailureKind, String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn unauthorized(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized(message),
            request_id,
        }
    }

    pub fn forbidden(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Forbidden(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Classify a core error. Server-side failures are logged here and
    /// reach the client only as a generic message.
    pub fn domain(request_id: &RequestId, error: impl Into<RaspadinhaError>) -> Self {
        let error = error.into();
        let kind = error.kind();

        let message = match kind {
            FailureKind::Conflict => {
                tracing::warn!(request_id = %request_id.0, error = %error, "Request hit lock contention");
                "The operation could not be completed right now, please retry".to_string()
            }
            FailureKind::Internal => {
                tracing::error!(request_id = %request_id.0, error = %error, "Request failed");
                "The operation failed and was rolled back".to_string()
            }
            FailureKind::Misconfigured => {
                tracing::error!(request_id = %request_id.0, error = %error, "Game is misconfigured");
                "This game is temporarily unavailable".to_string()
            }
            _ => error_message(&error),
        };

        Self {
            kind: ApiErrorKind::Domain(kind, message),
            request_id: request_id.0.clone(),
        }
    }
}

/// Innermost message, without the root error's category prefix
fn error_message(error: &RaspadinhaError) -> String {
    match error {
        RaspadinhaError::Configuration(e) => e.to_string(),
        RaspadinhaError::Storage(e) => e.to_string(),
        RaspadinhaError::PayoutTable(e) => e.to_string(),
        RaspadinhaError::Play(e) => e.to_string(),
        RaspadinhaError::Wallet(e) => e.to_string(),
        RaspadinhaError::Catalog(e) => e.to_string(),
    }
}

fn domain_status(kind: FailureKind) -> (StatusCode, &'static str) {
    match kind {
        FailureKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        FailureKind::Unavailable => (StatusCode::BAD_REQUEST, "GAME_UNAVAILABLE"),
        FailureKind::InsufficientFunds => (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS"),
        FailureKind::Invalid => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        FailureKind::Misconfigured => (StatusCode::INTERNAL_SERVER_ERROR, "GAME_MISCONFIGURED"),
        FailureKind::Conflict => (StatusCode::INTERNAL_SERVER_ERROR, "CONFLICT"),
        FailureKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Unauthorized(msg) => write!(f, "[{}] Unauthorized: {}", self.request_id, msg),
            ApiErrorKind::Forbidden(msg) => write!(f, "[{}] Forbidden: {}", self.request_id, msg),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
            ApiErrorKind::Domain(kind, msg) => write!(f, "[{}] {}: {}", self.request_id, kind, msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiErrorKind::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            ApiErrorKind::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, None)
            }
            ApiErrorKind::Domain(kind, msg) => {
                let (status, code) = domain_status(kind);
                let details = kind
                    .is_transient()
                    .then(|| serde_json::json!({ "retryable": true }));
                (status, code, msg, details)
            }
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}
