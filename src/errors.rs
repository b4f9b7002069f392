use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::rules::ValidationError;
use crate::storage::StorageError;

/// Errors surfaced by link management, redirect resolution and analytics
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("short link '{0}' not found")]
    NotFound(String),
    /// No identity, or an identity the token layer rejected
    #[error("authentication required")]
    Unauthenticated,
    /// Authenticated, but not the owner of the link
    #[error("you do not have permission to access this link")]
    Forbidden,
    #[error("short link '{0}' already exists")]
    Conflict(String),
    #[error("temporarily unavailable: {0}")]
    Transient(#[from] anyhow::Error),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            // callers with an id map Conflict themselves
            StorageError::Conflict => ServiceError::Conflict(String::new()),
            StorageError::Other(e) => ServiceError::Transient(e),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Transient(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            ServiceError::Transient(e) => {
                error!("Request failed: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
