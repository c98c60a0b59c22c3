//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.

use crate::errors::{CasinoError, RoundStateError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code (VALIDATION_ERROR, ROUND_NOT_FOUND, ...)
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    /// Failure reported by the game core
    Casino(CasinoError),
    /// Body or query the router could not decode
    BadRequest(String),
}

impl ApiError {
    pub fn casino(request_id: String, err: CasinoError) -> Self {
        Self {
            kind: ApiErrorKind::Casino(err),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn unauthorized(request_id: String) -> Self {
        Self::casino(request_id, CasinoError::Unauthorized)
    }

    /// Status, code and client-safe message
    fn parts(&self) -> (StatusCode, &'static str, String) {
        let err = match &self.kind {
            ApiErrorKind::BadRequest(msg) => {
                return (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
            }
            ApiErrorKind::Casino(err) => err,
        };
        match err {
            CasinoError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            CasinoError::InsufficientFunds { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS", err.to_string())
            }
            CasinoError::InvalidRoundState(RoundStateError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "ROUND_NOT_FOUND", err.to_string())
            }
            CasinoError::InvalidRoundState(e) => {
                (StatusCode::CONFLICT, "INVALID_ROUND_STATE", e.to_string())
            }
            CasinoError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or invalid credentials".to_string(),
            ),
            CasinoError::Internal(_) | CasinoError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::Casino(err) => write!(f, "[{}] {}", self.request_id, err),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Details stay in the log, the client gets the generic message
            error!(request_id = %self.request_id, "{}", self);
        }

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{InternalError, ValidationError};

    fn status_of(err: CasinoError) -> (StatusCode, &'static str) {
        let (status, code, _) = ApiError::casino("req".to_string(), err).parts();
        (status, code)
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(ValidationError::CellIndex { size: 25, actual: 25 }.into()),
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        );
        assert_eq!(
            status_of(CasinoError::InsufficientFunds { balance: 1, requested: 2 }),
            (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS")
        );
        assert_eq!(
            status_of(RoundStateError::NotFound("r".into()).into()),
            (StatusCode::NOT_FOUND, "ROUND_NOT_FOUND")
        );
        assert_eq!(
            status_of(RoundStateError::AlreadyFinished("r".into()).into()),
            (StatusCode::CONFLICT, "INVALID_ROUND_STATE")
        );
        assert_eq!(
            status_of(CasinoError::Unauthorized),
            (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
        );
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = ApiError::casino(
            "req".to_string(),
            InternalError::WriteFailed("disk at /var/secret".into()).into(),
        );
        let (status, code, message) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "INTERNAL_ERROR");
        assert!(!message.contains("secret"));
    }
}
