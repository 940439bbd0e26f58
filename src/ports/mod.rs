//! Ports - Interfaces between the application layer and the outside world.
//!
//! - [`AIProvider`]: the language-model engine
//! - [`CheckpointStore`]: per-thread conversation state

mod ai_provider;
mod checkpoint_store;

pub use ai_provider::{
    AIError, AIProvider, ChunkStream, CompletionRequest, CompletionResponse, FinishReason,
    Message, MessageRole, ProviderInfo, StreamChunk, TokenUsage,
};
pub use checkpoint_store::{CheckpointError, CheckpointStore};
