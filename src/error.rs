use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Current episode/segment state, attached to preconditioned-rejection errors
/// so callers don't need a follow-up read to explain why an operation was refused.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StateSnapshot {
    pub status: String,
    pub retry_count: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad input to an operation: unknown id, out-of-range index, empty path.
    #[error("validation error: {0}")]
    Validation(String),

    /// Legal request, disallowed by current state (retry past the cap, transcribe
    /// a segment with no source file). No state mutation happens.
    #[error("precondition failed: {message}")]
    PreconditionedRejection {
        message: String,
        state: StateSnapshot,
    },

    /// Clip extraction failed, the ASR engine raised, or a DB commit conflicted.
    /// Recorded as `failed` and counted against retry_count; eligible for re-drive.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// Model not loaded, required binary missing, required credential absent.
    /// Only ever returned from startup paths; never from a request handler.
    #[error("fatal process error: {0}")]
    Fatal(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::PreconditionedRejection { message, state } => (
                StatusCode::CONFLICT,
                json!({ "error": message, "state": state }),
            ),
            AppError::Transient(msg) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg })),
            AppError::Database(ref e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "database error" }),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Fatal(ref msg) => {
                tracing::error!("fatal error reached the HTTP boundary: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
            AppError::Internal(ref e) => {
                tracing::error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
