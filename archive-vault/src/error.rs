//! Error types for the vault HTTP API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::form::FormError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Form rejected the submission or file
    #[error("{0}")]
    Form(#[from] FormError),

    /// No session yet (503); the UI keeps showing its loading state
    #[error("Session not established")]
    NoSession,

    /// Identity provider or document store failure (502)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<archive_common::Error> for ApiError {
    fn from(err: archive_common::Error) -> Self {
        use archive_common::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::NoSession => ApiError::NoSession,
            Error::Transport(msg) => ApiError::Upstream(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Form(ref err) => {
                let (status, code) = match err {
                    FormError::NoSession => (StatusCode::SERVICE_UNAVAILABLE, "NO_SESSION"),
                    FormError::Busy => (StatusCode::CONFLICT, "BUSY"),
                    FormError::Upload => (StatusCode::BAD_GATEWAY, "UPLOAD_FAILED"),
                    _ => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION"),
                };
                (status, code, err.to_string())
            }
            ApiError::NoSession => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NO_SESSION",
                "Session not established".to_string(),
            ),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_errors_map_to_status() {
        let cases = [
            (FormError::Incomplete, StatusCode::UNPROCESSABLE_ENTITY),
            (FormError::NotPdf, StatusCode::UNPROCESSABLE_ENTITY),
            (FormError::Busy, StatusCode::CONFLICT),
            (FormError::Upload, StatusCode::BAD_GATEWAY),
            (FormError::NoSession, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_common_errors_map_to_status() {
        let not_found: ApiError = archive_common::Error::NotFound("r1".to_string()).into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let upstream: ApiError = archive_common::Error::Transport("down".to_string()).into();
        assert_eq!(upstream.into_response().status(), StatusCode::BAD_GATEWAY);

        let encoding: ApiError = archive_common::Error::Encoding("bad".to_string()).into();
        assert_eq!(encoding.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
