//! Client error types

/// Failure of a client session operation
///
/// `Clone` so a single in-flight connect attempt can hand the same outcome
/// to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Socket not connected")]
    NotConnected,
    #[error("Connection timeout")]
    Timeout,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
