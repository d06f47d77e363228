//! HTTP error mapping for the inventory API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use stockroom_engine::Error as EngineError;

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A payload broke a field rule shared with the client store.
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    /// Any other engine failure; never caused by the request itself.
    #[error("Engine error: {0}")]
    Engine(EngineError),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation { field, reason } => AppError::Validation { field, reason },
            EngineError::NotFound { collection, id } => {
                AppError::NotFound(format!("{collection} {id}"))
            }
            EngineError::AlreadyExists { collection, id } => {
                AppError::Conflict(format!("{collection} {id}"))
            }
            other => AppError::Engine(other),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Database(e) => {
                tracing::error!(error = ?e, "Database failure");
                ErrorBody {
                    error: "Database error".into(),
                    details: None,
                }
            }
            AppError::Engine(e) => {
                tracing::error!(error = %e, "Unexpected engine failure");
                ErrorBody {
                    error: "Internal error".into(),
                    details: None,
                }
            }
            AppError::Validation { field, reason } => {
                tracing::debug!(%field, %reason, "Rejected payload");
                ErrorBody {
                    error: "Invalid payload".into(),
                    details: Some(format!("{field}: {reason}")),
                }
            }
            AppError::BadRequest(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                ErrorBody {
                    error: msg.clone(),
                    details: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
