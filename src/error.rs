use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tokio_postgres::error::SqlState;

use crate::templates::ErrorTemplate;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, template, message) = match self {
            AppError::Database(ref err) => {
                if err.contains("timeout") {
                    tracing::warn!("PostgreSQL operation timeout: {}", err);
                } else {
                    tracing::error!("PostgreSQL database error: {}", err);
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorTemplate::server_error(),
                    None,
                )
            }
            AppError::Validation(ref message) => {
                tracing::debug!("Validation error: {}", message);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorTemplate::bad_request(),
                    Some(message.clone()),
                )
            }
            AppError::NotFound(ref resource) => {
                tracing::debug!("Resource not found: {}", resource);
                (StatusCode::NOT_FOUND, ErrorTemplate::not_found(), None)
            }
            AppError::Conflict(ref message) => {
                tracing::debug!("Constraint conflict: {}", message);
                (
                    StatusCode::CONFLICT,
                    ErrorTemplate::bad_request(),
                    Some(message.clone()),
                )
            }
            AppError::Template(ref err) => {
                tracing::error!("Template rendering failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorTemplate::server_error(),
                    None,
                )
            }
            AppError::Storage(ref err) => {
                tracing::error!("Media storage error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorTemplate::server_error(),
                    None,
                )
            }
            AppError::Internal(ref err) => {
                tracing::error!("Internal server error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorTemplate::server_error(),
                    None,
                )
            }
        };

        match template.with_message(message).render_html() {
            Ok(html) => (status, html).into_response(),
            // The error page itself failed; fall back to plain text.
            Err(_) => (status, Html(status.to_string())).into_response(),
        }
    }
}

// PostgreSQL error mapping
impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.code() {
            Some(&SqlState::UNIQUE_VIOLATION) => {
                let message = if err.to_string().contains("username") {
                    "A user with that username already exists".to_string()
                } else if err.to_string().contains("slug") {
                    "A group with that slug already exists".to_string()
                } else {
                    "Resource already exists".to_string()
                };
                AppError::Conflict(message)
            }
            Some(&SqlState::FOREIGN_KEY_VIOLATION) => {
                AppError::Validation("Referenced resource does not exist".to_string())
            }
            Some(&SqlState::NOT_NULL_VIOLATION) => {
                AppError::Validation("Required field is missing".to_string())
            }
            Some(&SqlState::CHECK_VIOLATION) => {
                AppError::Validation("Data validation constraint violated".to_string())
            }
            Some(&SqlState::STRING_DATA_LENGTH_MISMATCH)
            | Some(&SqlState::STRING_DATA_RIGHT_TRUNCATION) => {
                AppError::Validation("Text data exceeds maximum length".to_string())
            }
            Some(&SqlState::CONNECTION_EXCEPTION)
            | Some(&SqlState::CONNECTION_DOES_NOT_EXIST)
            | Some(&SqlState::CONNECTION_FAILURE) => {
                tracing::error!("PostgreSQL connection error: {}", err);
                AppError::Database("Database connection unavailable".to_string())
            }
            _ => {
                tracing::error!("Unhandled PostgreSQL error: {} (code: {:?})", err, err.code());
                AppError::Database("Database operation failed".to_string())
            }
        }
    }
}

// Connection pool error mapping
impl From<deadpool_postgres::PoolError> for AppError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                tracing::warn!("Database connection pool timeout: {}", err);
                AppError::Database("Database connection timeout".to_string())
            }
            deadpool_postgres::PoolError::Closed => {
                tracing::error!("Database connection pool is closed: {}", err);
                AppError::Database("Database service unavailable".to_string())
            }
            _ => {
                tracing::error!("Database connection pool error: {}", err);
                AppError::Database("Database connection unavailable".to_string())
            }
        }
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
