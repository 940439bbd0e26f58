//! In-Memory Checkpoint Store Adapter
//!
//! Stores conversation state in process memory. State does not survive a
//! restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{ChatState, ThreadId};
use crate::ports::{CheckpointError, CheckpointStore};

/// In-memory storage for conversation state
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    states: Arc<RwLock<HashMap<ThreadId, ChatState>>>,
}

impl InMemoryCheckpointStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<ChatState>, CheckpointError> {
        let states = self.states.read().await;
        Ok(states.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &ThreadId, state: &ChatState) -> Result<(), CheckpointError> {
        let mut states = self.states.write().await;
        states.insert(thread_id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &ThreadId) -> Result<(), CheckpointError> {
        self.states.write().await.remove(thread_id);
        Ok(())
    }

    async fn thread_count(&self) -> Result<usize, CheckpointError> {
        Ok(self.states.read().await.len())
    }
}
