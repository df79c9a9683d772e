//! Error types for the job pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Job pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Artifact persist or enqueue failed; the job was never created
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Dataset unreadable or in an unsupported format
    #[error("Failed to load dataset '{filename}': {message}")]
    Load { filename: String, message: String },

    /// Failure inside the analysis stages
    #[error("Pipeline failed: {0}")]
    Pipeline(String),

    /// Result store, artifact store or queue unavailable
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad request from a caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a submission error
    pub fn submission(message: impl Into<String>) -> Self {
        Self::Submission(message.into())
    }

    /// Create a dataset load error
    pub fn load(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create a pipeline error
    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::Pipeline(message.into())
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Store-layer failures abort the handling attempt so the queue redelivers.
    /// Everything else is recorded as an error result.
    pub fn is_store(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Submission(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "submission_error",
                msg.clone(),
            ),
            Error::Load { .. } => (StatusCode::BAD_REQUEST, "load_error", self.to_string()),
            Error::Pipeline(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "pipeline_error", msg.clone())
            }
            Error::Store(msg) => (StatusCode::SERVICE_UNAVAILABLE, "store_error", msg.clone()),
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
            Error::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
