//! Error types for wxgate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Malformed envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl Error {
    /// HTTP status this error is surfaced as at the request boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Auth(AuthError::MissingParameter(_)) => StatusCode::BAD_REQUEST,
            Error::Auth(AuthError::SignatureMismatch) => StatusCode::UNAUTHORIZED,
            Error::Envelope(_) => StatusCode::BAD_REQUEST,
            Error::Worker(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Callback authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid signature")]
    SignatureMismatch,
}

/// Envelope decode/encode errors.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Request body is empty")]
    Empty,

    #[error("Invalid XML: {0}")]
    Syntax(String),

    #[error("Missing required tag: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Failed to encode reply: {0}")]
    Encode(String),
}

/// Worker pool errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker pool is empty")]
    PoolExhausted,

    #[error("Worker {index} not found in pool")]
    NotFound { index: u32 },

    #[error("Worker {index} failed to start: {reason}")]
    ActivationFailed { index: u32, reason: String },
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
