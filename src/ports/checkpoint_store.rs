//! Checkpoint Store Port - Interface for persisting conversation state.
//!
//! Each thread's [`ChatState`] is saved after a completed turn and loaded at
//! the start of the next one.

use async_trait::async_trait;

use crate::domain::{ChatState, ThreadId};

/// Errors that can occur during checkpoint operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Port for persisting and loading conversation state
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the state for a thread.
    ///
    /// Returns `Ok(None)` when the thread has never been saved.
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<ChatState>, CheckpointError>;

    /// Save (replace) the state for a thread.
    async fn save(&self, thread_id: &ThreadId, state: &ChatState) -> Result<(), CheckpointError>;

    /// Delete all state for a thread. Deleting an unknown thread is not an error.
    async fn delete(&self, thread_id: &ThreadId) -> Result<(), CheckpointError>;

    /// Number of threads currently stored.
    async fn thread_count(&self) -> Result<usize, CheckpointError>;
}
