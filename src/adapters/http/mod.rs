//! HTTP adapters - REST and SSE endpoints.

pub mod chat;

pub use chat::{chat_router, chat_routes, ChatAppState};
