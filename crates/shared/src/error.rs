//! Error types for the conversation store

use thiserror::Error;

use crate::types::ConversationId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conversation {0} is closed")]
    Closed(ConversationId),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = ?err, "Conversation store database error");
        StoreError::Persistence(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
