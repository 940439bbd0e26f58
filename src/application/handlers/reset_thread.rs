//! ResetThread command handler.

use std::sync::Arc;

use crate::application::{ChatEngine, ChatError};
use crate::domain::ThreadId;

/// Command to forget everything stored for a thread.
#[derive(Debug, Clone)]
pub struct ResetThreadCommand {
    pub thread_id: ThreadId,
}

#[derive(Clone)]
pub struct ResetThreadHandler {
    engine: Arc<ChatEngine>,
}

impl ResetThreadHandler {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }

    /// Clears the thread. Resetting an unknown thread succeeds.
    pub async fn handle(&self, cmd: ResetThreadCommand) -> Result<(), ChatError> {
        self.engine.reset(&cmd.thread_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockAIProvider;
    use crate::adapters::storage::InMemoryCheckpointStore;

    #[tokio::test]
    async fn reset_only_touches_named_thread() {
        let engine = Arc::new(ChatEngine::new(
            Arc::new(MockAIProvider::new()),
            Arc::new(InMemoryCheckpointStore::new()),
        ));
        let keep = ThreadId::new("keep").unwrap();
        let drop_me = ThreadId::new("drop").unwrap();
        engine.invoke(&keep, "a").await.unwrap();
        engine.invoke(&drop_me, "b").await.unwrap();

        ResetThreadHandler::new(Arc::clone(&engine))
            .handle(ResetThreadCommand {
                thread_id: drop_me.clone(),
            })
            .await
            .unwrap();

        assert!(engine.history(&drop_me).await.unwrap().is_empty());
        assert_eq!(engine.history(&keep).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reset_unknown_thread_succeeds() {
        let engine = ChatEngine::new(
            Arc::new(MockAIProvider::new()),
            Arc::new(InMemoryCheckpointStore::new()),
        );

        ResetThreadHandler::new(Arc::new(engine))
            .handle(ResetThreadCommand {
                thread_id: ThreadId::new("ghost").unwrap(),
            })
            .await
            .unwrap();
    }
}
