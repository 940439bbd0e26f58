//! GetHistory query handler.

use std::sync::Arc;

use crate::application::{ChatEngine, ChatError};
use crate::domain::{ChatState, ThreadId};

/// Query for the stored messages of one thread.
#[derive(Debug, Clone)]
pub struct GetHistoryQuery {
    pub thread_id: ThreadId,
}

/// Handler returning a thread's history, oldest first.
#[derive(Clone)]
pub struct GetHistoryHandler {
    engine: Arc<ChatEngine>,
}

impl GetHistoryHandler {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }

    pub async fn handle(&self, query: GetHistoryQuery) -> Result<ChatState, ChatError> {
        self.engine.history(&query.thread_id).await
    }
}
