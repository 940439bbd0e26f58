//! Application layer - Chat engine, commands, queries, and handlers.
//!
//! This layer orchestrates conversation turns and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

mod chat_engine;
mod errors;
pub mod handlers;

pub use chat_engine::{ChatEngine, TokenStream};
pub use errors::ChatError;
pub use handlers::{
    FrameStream, GetHistoryHandler, GetHistoryQuery, RelayFrame, ResetThreadCommand,
    ResetThreadHandler, SendMessageCommand, SendMessageHandler, SendMessageResult,
    StreamMessageCommand, StreamMessageHandler,
};
