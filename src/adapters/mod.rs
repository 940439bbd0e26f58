//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the application to external systems:
//! - `ai` - Model providers (Gemini, mock)
//! - `http` - Axum routes and handlers
//! - `storage` - Checkpoint storage

pub mod ai;
pub mod http;
pub mod storage;
