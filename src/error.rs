use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error ({code}): {message}")]
    Validation { code: &'static str, message: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    /// Metadata exists but the blob is gone from the upload directory
    #[error("Blob missing: {0}")]
    BlobMissing(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::BlobMissing(_) | AppError::RouteNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::Database(_)
            | AppError::Io(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { code, .. } => *code,
            AppError::NotFound(_) => "document_not_found",
            AppError::BlobMissing(_) => "file_not_found",
            AppError::RouteNotFound(_) => "not_found",
            AppError::Database(_) => "database_error",
            AppError::Io(_) | AppError::Storage(_) => "storage_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Server-side error text attached to 5xx responses.
/// Only surfaced to clients by `middleware::error_detail` in development.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, detail) = match &self {
            AppError::Validation { message, .. } => (message.clone(), None),
            AppError::NotFound(msg) | AppError::BlobMissing(msg) | AppError::RouteNotFound(msg) => {
                (msg.clone(), None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    "An error occurred while accessing the database".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {:?}", e);
                (
                    "An error occurred while accessing file storage".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    "An error occurred while accessing file storage".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error".to_string(), Some(msg.clone()))
            }
        };

        let body = Json(ErrorBody {
            error: code.to_string(),
            message,
            detail: None,
        });
        let mut response = (status, body).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
