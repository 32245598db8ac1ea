//! # Error Handling and Response Types
//!
//! Errors raised by HTTP handlers. Distutils clients print the response body
//! verbatim, so every error is rendered as a short plain-text message with a
//! status code taken from its [`ErrorCode`]. Fatal errors never leak their
//! details to the client; those only go to the log.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use pkgindex_core::IndexError;

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    AuthError,
    Forbidden,
    NotFound,
    UploadError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::AuthError => "auth_error",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::UploadError => "upload_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::AuthError => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::UploadError => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Multipart form parsing error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UploadError(String),

    /// Missing or rejected credentials. Carries the realm for the challenge.
    #[error("Unauthorized: {message}")]
    Unauthorized { realm: String, message: String },

    #[error(transparent)]
    Index(IndexError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::BadRequest(_) | AppError::Json(_) => ErrorCode::ValidationError,
            AppError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ErrorCode::UploadError
            }
            AppError::Multipart(_) => ErrorCode::ValidationError,
            AppError::Forbidden(_) => ErrorCode::Forbidden,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::UploadError(_) => ErrorCode::UploadError,
            AppError::Unauthorized { .. } => ErrorCode::AuthError,
            AppError::Index(IndexError::BadRequest(_)) => ErrorCode::ValidationError,
            AppError::Index(IndexError::Forbidden(_)) => ErrorCode::Forbidden,
            AppError::Index(_) | AppError::Io(_) | AppError::Anyhow(_) => ErrorCode::InternalError,
        }
    }

    /// Text sent to the client.
    pub fn public_message(&self) -> String {
        match self.error_code() {
            ErrorCode::InternalError => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::BadRequest(msg) => AppError::BadRequest(msg),
            IndexError::Forbidden(msg) => AppError::Forbidden(msg),
            other => AppError::Index(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if code == ErrorCode::InternalError {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, code = code.as_str(), "Request rejected");
        }

        let mut response = (status, self.public_message()).into_response();

        if let AppError::Unauthorized { realm, .. } = &self {
            if let Ok(challenge) = HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, challenge);
            }
        }

        response
    }
}

/// Convenient result type for application operations.
pub type AppResult<T> = Result<T, AppError>;
