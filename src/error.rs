//! Error types for the library server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;

use crate::query::QueryError;

static EXPOSE_DETAILS: OnceCell<bool> = OnceCell::new();

/// Decide once, at startup, whether error bodies carry the underlying cause.
/// Later calls are ignored.
pub fn init_error_details(expose: bool) {
    let _ = EXPOSE_DETAILS.set(expose);
}

fn exposes_details() -> bool {
    EXPOSE_DETAILS.get().copied().unwrap_or(false)
}

/// Machine-checkable error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    Forbidden = 3,
    DbFailure = 4,
    NotFound = 5,
    BadValue = 6,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// Failure of an operation whose cause must not reach production clients
    #[error("{message}: {cause}")]
    Unexpected { message: String, cause: String },
}

impl AppError {
    /// Keep domain errors as they are and fold everything else into a
    /// generic failure carrying `message`.
    pub fn or_unexpected(self, message: &str) -> Self {
        match self {
            AppError::BadRequest(_)
            | AppError::NotFound(_)
            | AppError::Validation(_)
            | AppError::Authentication(_)
            | AppError::Authorization(_) => self,
            AppError::Unexpected { cause, .. } => AppError::Unexpected {
                message: message.to_string(),
                cause,
            },
            other => AppError::Unexpected {
                message: message.to_string(),
                cause: other.to_string(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) | AppError::Unexpected { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) => ErrorCode::NotAuthenticated,
            AppError::Authorization(_) => ErrorCode::Forbidden,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Validation(_) | AppError::BadRequest(_) => ErrorCode::BadValue,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) | AppError::Unexpected { .. } => ErrorCode::Failure,
        }
    }

    fn body(&self, expose: bool) -> ErrorResponse {
        let (message, details) = match self {
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::BadRequest(msg) => (msg.clone(), None),
            AppError::Database(e) => ("Database error".to_string(), Some(e.to_string())),
            AppError::Internal(msg) => ("Internal server error".to_string(), Some(msg.clone())),
            AppError::Unexpected { message, cause } => (message.clone(), Some(cause.clone())),
        };

        let code = self.code();
        ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            details: details.filter(|_| expose),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(
                error.cause_chain = ?self,
                error.message = %self,
                "Unexpected error happened"
            );
        }

        (status, Json(self.body(exposes_details()))).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
