//! Application error taxonomy.

use thiserror::Error;

use crate::domain::ValidationError;
use crate::ports::{AIError, CheckpointError};

/// Errors surfaced by chat operations.
///
/// Every failure a caller can observe falls into exactly one of these
/// categories, which the HTTP layer maps to status codes and SSE error frames.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    /// Bad caller input (empty streaming message, malformed thread id).
    #[error("{0}")]
    Validation(String),

    /// The model engine failed, or could not be reached.
    #[error("{0}")]
    Upstream(AIError),

    /// Conversation state could not be loaded or saved.
    #[error("checkpoint store error: {0}")]
    Checkpoint(String),
}

impl ChatError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable category name.
    ///
    /// Connection failures and timeouts report `transport`; every other
    /// provider failure reports `upstream`.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation",
            ChatError::Upstream(AIError::Network(_) | AIError::Timeout { .. }) => "transport",
            ChatError::Upstream(_) => "upstream",
            ChatError::Checkpoint(_) => "checkpoint",
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Upstream(err) => err.is_retryable(),
            ChatError::Validation(_) | ChatError::Checkpoint(_) => false,
        }
    }

    /// Message safe to show to clients. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Checkpoint(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<AIError> for ChatError {
    fn from(err: AIError) -> Self {
        ChatError::Upstream(err)
    }
}

impl From<CheckpointError> for ChatError {
    fn from(err: CheckpointError) -> Self {
        ChatError::Checkpoint(err.to_string())
    }
}

impl From<ValidationError> for ChatError {
    fn from(err: ValidationError) -> Self {
        ChatError::Validation(err.to_string())
    }
}
