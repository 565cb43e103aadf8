use aide::OperationOutput;
use aide::openapi::{MediaType, Response as AideResponse};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy used by the worker runtime to decide retry behavior.
/// HTTP handlers only ever see `AppError`; `ErrorKind` is attached to
/// job metadata so a caller can tell "will this be retried" from "is
/// this terminal".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    IoTransient,
    IoFatal,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::IoTransient => "io_transient",
            ErrorKind::IoFatal => "io_fatal",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }

    /// Only `io_transient` errors are retried by the worker runtime.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorKind::IoTransient)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl AppError {
    /// Classify this error into the retry-decision taxonomy above.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::BadRequest(_)
            | AppError::NotFound(_)
            | AppError::Conflict(_)
            | AppError::Validation(_) => ErrorKind::Validation,
            AppError::Database(_) | AppError::Storage(_) => ErrorKind::IoTransient,
            AppError::Io(_) => ErrorKind::IoFatal,
            AppError::Serialization(_) | AppError::Config(_) | AppError::Internal(_) => {
                ErrorKind::Internal
            }
            AppError::Processing(_) => ErrorKind::IoFatal,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub description: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, description) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NotFound", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "Validation", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DatabaseError",
                    "Database error occurred".to_string(),
                )
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SerializationError",
                    "Serialization error occurred".to_string(),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IoError",
                    "IO error occurred".to_string(),
                )
            }
            AppError::Config(msg) => {
                tracing::error!("Config error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ConfigError",
                    "Configuration error".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "StorageError",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Processing(msg) => {
                tracing::error!("Processing error: {}", msg);
                (StatusCode::BAD_REQUEST, "ProcessingError", msg.clone())
            }
        };

        let body = Json(ErrorResponse {
            code: code.to_string(),
            description,
        });

        (status, body).into_response()
    }
}

impl OperationOutput for AppError {
    type Inner = ErrorResponse;

    fn operation_response(
        ctx: &mut aide::generate::GenContext,
        _operation: &mut aide::openapi::Operation,
    ) -> Option<AideResponse> {
        let schema = ctx.schema.subschema_for::<ErrorResponse>();

        let mut content = IndexMap::new();
        content.insert(
            "application/json".to_string(),
            MediaType {
                schema: Some(aide::openapi::SchemaObject {
                    json_schema: schema,
                    external_docs: None,
                    example: None,
                }),
                ..Default::default()
            },
        );

        Some(AideResponse {
            description: "Error response".to_string(),
            content,
            ..Default::default()
        })
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retriable() {
        assert!(!ErrorKind::Validation.is_retriable());
        assert!(!ErrorKind::IoFatal.is_retriable());
        assert!(!ErrorKind::Timeout.is_retriable());
        assert!(!ErrorKind::Cancelled.is_retriable());
        assert!(!ErrorKind::Internal.is_retriable());
    }

    #[test]
    fn transient_io_is_retriable() {
        assert!(ErrorKind::IoTransient.is_retriable());
    }

    #[test]
    fn bad_request_classifies_as_validation() {
        assert_eq!(
            AppError::BadRequest("bad".into()).kind(),
            ErrorKind::Validation
        );
    }
}
