use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::ride::RideStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: RideStatus, to: RideStatus },

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("driver index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::ExternalService(_) => "external_service_error",
            AppError::IndexUnavailable(_) => "index_unavailable",
            AppError::Persistence(_) => "persistence_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::IndexUnavailable(_) | AppError::Persistence(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthenticated(msg)
            | AppError::Unauthorized(msg)
            | AppError::Conflict(msg)
            | AppError::ExternalService(msg)
            | AppError::IndexUnavailable(msg)
            | AppError::Persistence(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::InvalidTransition { .. } => self.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}
