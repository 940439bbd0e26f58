//! Conversation module - messages and per-thread history.

mod message;
mod state;

pub use message::{ChatMessage, ChatRole};
pub use state::ChatState;
