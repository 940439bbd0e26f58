//! Application handlers.
//!
//! Command and query handlers over the chat engine.

mod get_history;
mod reset_thread;
mod send_message;
mod stream_message;

pub use get_history::{GetHistoryHandler, GetHistoryQuery};
pub use reset_thread::{ResetThreadCommand, ResetThreadHandler};
pub use send_message::{SendMessageCommand, SendMessageHandler, SendMessageResult};
pub use stream_message::{FrameStream, RelayFrame, StreamMessageCommand, StreamMessageHandler};
