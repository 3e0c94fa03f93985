//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingest::gap::GapError;
use crate::ingest::{BackfillError, ImportError};
use crate::progress::ProgressError;
use crate::queue::QueueError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),
            AppError::Upstream(message) => {
                tracing::warn!("Upstream error: {}", message);
                (StatusCode::BAD_GATEWAY, message)
            },
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
            },
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(id) => AppError::NotFound(format!("Job {} not found", id)),
            QueueError::InvalidState { .. } => AppError::Conflict(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<ProgressError> for AppError {
    fn from(err: ProgressError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<GapError> for AppError {
    fn from(err: GapError) -> Self {
        match err {
            GapError::Universe(e) => AppError::Upstream(e.to_string()),
            GapError::Store(e) => e.into(),
            GapError::Progress(e) => e.into(),
        }
    }
}

impl From<BackfillError> for AppError {
    fn from(err: BackfillError) -> Self {
        match err {
            BackfillError::AlreadyRunning | BackfillError::AlreadyCompleted | BackfillError::NotStarted => {
                AppError::Conflict(err.to_string())
            },
            BackfillError::InvalidBatchSize => AppError::Validation(err.to_string()),
            BackfillError::Queue(e) => e.into(),
            BackfillError::Progress(e) => e.into(),
            BackfillError::Gap(e) => e.into(),
        }
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::AlreadyRunning(_) => AppError::Conflict(err.to_string()),
            ImportError::UnknownFestival(_) => AppError::NotFound(err.to_string()),
            ImportError::InvalidYear { .. } | ImportError::NoYears | ImportError::Invalid(_) => AppError::Validation(err.to_string()),
            ImportError::Queue(e) => e.into(),
            ImportError::Progress(e) => e.into(),
        }
    }
}
