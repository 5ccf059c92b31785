//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use lode_core::LFS_MEDIA_TYPE;
use lode_storage::StorageError;
use serde::Serialize;

/// API error response.
///
/// Git LFS clients display `message`; `code` is for programmatic handling.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid request: {0}")]
    Core(#[from] lode_core::Error),

    #[error("signer error: {0}")]
    Signer(#[from] lode_signer::SignerError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::NotImplemented(_) => "not_implemented",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Internal(_) => "internal_error",
            Self::Storage(e) => match e {
                StorageError::SizeMismatch { .. } => "size_mismatch",
                StorageError::HashMismatch { .. } => "hash_mismatch",
                _ => "storage_error",
            },
            Self::Core(_) => "invalid_request",
            Self::Signer(_) => "signer_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                e if e.is_client_error() => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Signer(e) => {
                if e.is_rejection() {
                    StatusCode::UNAUTHORIZED
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, [(CONTENT_TYPE, LFS_MEDIA_TYPE)], Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::NotImplemented("tus".into()).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            ApiError::from(StorageError::SizeMismatch {
                expected: 42,
                actual: 3
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StorageError::Io(std::io::Error::other("disk"))).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(lode_signer::SignerError::Expired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(lode_signer::SignerError::InvalidKey("short".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_response_uses_lfs_media_type() {
        let response = ApiError::BadRequest("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], LFS_MEDIA_TYPE);
    }
}
