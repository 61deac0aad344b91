//! Caller-facing error type.
//!
//! Every gateway and orchestrator operation fails with an [`AppError`]. It
//! renders as a JSON body with a machine-readable code:
//!
//! ```json
//! { "error": { "code": "already_exists", "message": "video abc123 is already registered" } }
//! ```
//!
//! | Variant | Status | Code |
//! |---------|--------|------|
//! | `Validation` | 400 | `bad_request` |
//! | `InvalidReference` | 400 | `invalid_reference` |
//! | `AlreadyExists` | 409 | `already_exists` |
//! | `NotFound` | 404 | `not_found` |
//! | `UpstreamUnavailable` | 502 | `upstream_unavailable` |
//! | `Storage` | 500 | `storage_error` |
//!
//! Storage details and upstream response bodies are logged, never returned
//! to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use ytchat_core::store::StoreError;

use crate::capabilities::CapabilityError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("not a recognised video URL: '{0}'")]
    InvalidReference(String),

    #[error("video {0} is already registered")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(#[from] CapabilityError),

    #[error("storage failure")]
    Storage(#[source] StoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidReference(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_request",
            Self::InvalidReference(_) => "invalid_reference",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { platform_id } => Self::AlreadyExists(platform_id),
            StoreError::MissingVideo { video_id } => {
                Self::NotFound(format!("video {} not found", video_id))
            }
            other => Self::Storage(other),
        }
    }
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Storage(source) => {
                tracing::error!(error = %source, "storage operation failed");
            }
            Self::UpstreamUnavailable(source) => {
                tracing::warn!(capability = source.capability(), error = %source,
                    "upstream capability failed");
            }
            _ => {}
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}
