use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::document::format::ConversionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session expired or missing")]
    SessionExpired,

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Document conversion failed: {0}")]
    Conversion(ConversionError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ConversionError> for AppError {
    fn from(e: ConversionError) -> Self {
        match e {
            ConversionError::Unsupported(name) => AppError::UnsupportedFormat(name),
            other => AppError::Conversion(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::SessionExpired => (
                StatusCode::GONE,
                "SESSION_EXPIRED",
                "Session expired or file not found. Please upload again.".to_string(),
            ),
            AppError::UnsupportedFormat(name) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_FORMAT",
                format!("{name} is not a DOCX, PDF or plain-text file"),
            ),
            AppError::Conversion(e) => {
                tracing::warn!("Conversion error: {e}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "CONVERSION_ERROR",
                    e.to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
