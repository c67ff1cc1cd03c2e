use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("ride {0} is already assigned to a driver")]
    AlreadyAssigned(uuid::Uuid),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("missing or malformed caller identity: {0}")]
    Unauthenticated(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// `AlreadyAssigned` is the specific form of an illegal transition raised
    /// when a driver is already bound.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, AppError::InvalidState(_) | AppError::AlreadyAssigned(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidState(_) => "invalid_state",
            AppError::AlreadyAssigned(_) => "already_assigned",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) | AppError::Unauthenticated(_) => "unauthorized",
            AppError::Transport(_) => "transport",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidState(_) | AppError::AlreadyAssigned(_) | AppError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::InvalidState(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Unauthenticated(msg)
            | AppError::Transport(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::AlreadyAssigned(_) => self.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
