//! Application error types for songboard.
//!
//! Provides a unified error type that implements `IntoResponse` for Axum.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database setup errors (connection, migrations)
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// SQLite-specific errors (for direct rusqlite usage)
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration loading/parsing errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Local resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The catalog answered but has no matching entity
    #[error("Not found in catalog: {0}")]
    CatalogNotFound(String),

    /// Network, HTTP or payload failure talking to the catalog
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl AppError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::CatalogNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::CatalogUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Sqlite(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (error, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                ("database_error", None)
            }
            AppError::Sqlite(e) => {
                tracing::error!("SQLite error: {:?}", e);
                ("database_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                ("configuration_error", None)
            }
            AppError::NotFound(resource) => ("not_found", Some(resource.clone())),
            AppError::BadRequest(msg) => ("bad_request", Some(msg.clone())),
            AppError::CatalogNotFound(msg) => ("catalog_not_found", Some(msg.clone())),
            AppError::CatalogUnavailable(msg) => {
                tracing::warn!("Catalog unavailable: {}", msg);
                ("catalog_unavailable", Some(msg.clone()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
