//! SendMessage command handler.
//!
//! Runs a full turn and returns the assistant's reply in one piece.

use std::sync::Arc;

use crate::application::{ChatEngine, ChatError};
use crate::domain::ThreadId;

/// Command to send a message and wait for the whole reply.
#[derive(Debug, Clone)]
pub struct SendMessageCommand {
    /// Thread the turn belongs to.
    pub thread_id: ThreadId,
    /// The message content, stored as given.
    pub message: String,
}

impl SendMessageCommand {
    pub fn new(thread_id: ThreadId, message: impl Into<String>) -> Self {
        Self {
            thread_id,
            message: message.into(),
        }
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct SendMessageResult {
    /// The assistant's reply text.
    pub response: String,
}

/// Handler for non-streaming chat turns.
#[derive(Clone)]
pub struct SendMessageHandler {
    engine: Arc<ChatEngine>,
}

impl SendMessageHandler {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }

    /// Handles a send message command.
    pub async fn handle(&self, cmd: SendMessageCommand) -> Result<SendMessageResult, ChatError> {
        let reply = self.engine.invoke(&cmd.thread_id, &cmd.message).await?;

        Ok(SendMessageResult {
            response: reply.content,
        })
    }
}
