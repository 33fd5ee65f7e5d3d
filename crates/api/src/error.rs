//! API and relay error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use salonchat_shared::{ConversationId, ErrorPayload, StoreError};
use serde_json::json;

/// Failure of a relay operation
///
/// Reported only to the session (or HTTP caller) that issued the operation,
/// never broadcast to a room.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    #[error("Conversation not found")]
    NotFound(ConversationId),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Failed to persist change")]
    Persistence(String),
    #[error("Invalid event format")]
    InvalidEvent(String),
}

impl RelayError {
    /// Stable code carried by the `error` event
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::NotFound(_) => "NOT_FOUND",
            RelayError::Validation(_) => "VALIDATION_ERROR",
            RelayError::Conflict(_) => "CONFLICT",
            RelayError::Forbidden(_) => "FORBIDDEN",
            RelayError::Persistence(_) => "PERSISTENCE_FAILURE",
            RelayError::InvalidEvent(_) => "INVALID_EVENT",
        }
    }

    pub fn to_payload(
        &self,
        event: Option<&str>,
        conversation_id: Option<ConversationId>,
        client_message_id: Option<String>,
    ) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            event: event.map(str::to_string),
            conversation_id,
            client_message_id,
        }
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => RelayError::NotFound(id),
            StoreError::Validation(msg) => RelayError::Validation(msg),
            StoreError::Closed(_) => RelayError::Conflict("Conversation is closed".to_string()),
            StoreError::Conflict(msg) => RelayError::Conflict(msg),
            StoreError::Persistence(msg) => RelayError::Persistence(msg),
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string()),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", "AI suggestion service failed".to_string()),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        RelayError::from(err).into()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotFound(_) => ApiError::NotFound,
            RelayError::Validation(msg) => ApiError::Validation(msg),
            RelayError::Conflict(msg) => ApiError::Conflict(msg),
            RelayError::Forbidden(_) => ApiError::Forbidden,
            RelayError::Persistence(msg) => ApiError::Database(msg),
            RelayError::InvalidEvent(msg) => ApiError::BadRequest(msg),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
