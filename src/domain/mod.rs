//! Domain layer - value objects and entities of the chat relay.

pub mod conversation;
pub mod foundation;

pub use conversation::{ChatMessage, ChatRole, ChatState};
pub use foundation::{MessageId, ThreadId, Timestamp, ValidationError};
