//! Error types for the inspection pipeline and HTTP handlers

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::provider::ProviderError;

pub type Result<T, E = InspectionError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum InspectionError {
    /// A single document or media file could not be uploaded.
    /// Batch loaders record this and keep going.
    #[error("Failed to load {}: {reason}", path.display())]
    FileLoad { path: PathBuf, reason: String },

    #[error("Unreadable media {}: {reason}", path.display())]
    UnreadableMedia { path: PathBuf, reason: String },

    #[error("Provider reported processing failure for {name}")]
    UploadFailed { name: String },

    #[error("Timed out after {}s waiting for {name} to finish processing", waited.as_secs())]
    UploadTimeout { name: String, waited: Duration },

    #[error("Cancelled while waiting for {name}")]
    Cancelled { name: String },

    #[error("Malformed report: {0}")]
    MalformedReport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InspectionError {
    pub fn file_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        InspectionError::FileLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        InspectionError::UnreadableMedia {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            InspectionError::FileLoad { .. } => (StatusCode::BAD_GATEWAY, "FILE_LOAD"),
            InspectionError::UnreadableMedia { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNREADABLE_MEDIA")
            }
            InspectionError::UploadFailed { .. } => (StatusCode::BAD_GATEWAY, "UPLOAD_FAILED"),
            InspectionError::UploadTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "UPLOAD_TIMEOUT")
            }
            InspectionError::Cancelled { .. } => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
            InspectionError::MalformedReport(_) => (StatusCode::BAD_GATEWAY, "MALFORMED_REPORT"),
            InspectionError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION")
            }
            InspectionError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            InspectionError::Provider(_) => (StatusCode::BAD_GATEWAY, "PROVIDER"),
            InspectionError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO"),
        }
    }
}

impl IntoResponse for InspectionError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        tracing::error!(code, error = %self, "request failed");

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Extension trait for logging incidental errors and converting to StatusCode
pub trait LogErr<T> {
    /// Log error with context and return INTERNAL_SERVER_ERROR
    fn log_500(self, context: &str) -> Result<T, StatusCode>;

    /// Log error with context and return a custom StatusCode
    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, StatusCode> {
        self.log_status(context, StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{}", context);
            status
        })
    }
}
