use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use huddle_core::ChatError;
use huddle_types::api::ErrorBody;

/// JSON error response: `{code, message}` with a matching status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "internal error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            // Same body for missing and hidden channels.
            ChatError::Forbidden => Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string()),
            ChatError::Validation(message) => Self::new(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", message),
            ChatError::AttachmentTooLarge { .. } => {
                Self::new(StatusCode::PAYLOAD_TOO_LARGE, "ATTACHMENT_TOO_LARGE", err.to_string())
            }
            ChatError::NotFound(what) => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{} not found", what))
            }
            ChatError::Conflict(message) => Self::new(StatusCode::CONFLICT, "CONFLICT", message),
            ChatError::Storage(e) => {
                error!("Storage error: {:#}", e);
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
