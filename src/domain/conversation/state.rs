//! Per-thread conversation state.

use serde::{Deserialize, Serialize};

use super::message::{ChatMessage, ChatRole};

/// Ordered, append-only history of one conversation thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatState {
    messages: Vec<ChatMessage>,
}

impl ChatState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message at the end of the history.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The newest model-authored message, if any.
    pub fn last_assistant(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::Assistant)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
