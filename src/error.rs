use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

/// Error kinds per the §7 error mapping: BadRequest/Unauthorized/NotFound/
/// DuplicateCommitment/Gone are client-caused and carry a detail string;
/// Internal covers I/O failure, entropy failure, and any cryptographic
/// authentication failure (AES tag mismatch, RSA-PSS verify exception) —
/// those never surface as a bare boolean to the client.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    DuplicateCommitment,
    Gone(String),
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateCommitment => StatusCode::CONFLICT,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateCommitment => "DUPLICATE_COMMITMENT",
            AppError::Gone(_) => "GONE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the sanitized message shown to clients.
    /// Internal details are logged server-side only.
    fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Unauthorized => "unauthorized".into(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::DuplicateCommitment => "commitment already used".into(),
            AppError::Gone(msg) => msg.clone(),
            AppError::Internal(_) => "internal error".into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            AppError::Unauthorized => write!(f, "unauthorized"),
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::DuplicateCommitment => write!(f, "duplicate commitment"),
            AppError::Gone(msg) => write!(f, "gone: {msg}"),
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full error server-side for debugging.
        // SECURITY: never expose internal failure detail (I/O, decryption,
        // entropy) to the client beyond a generic message.
        if let AppError::Internal(_) = &self {
            error!(error = %self, "request failed");
        }

        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "detail": self.public_message(),
        });
        (status, axum::Json(body)).into_response()
    }
}
