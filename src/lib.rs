//! Chat Relay - conversational relay over a large-language-model engine.
//!
//! Accepts chat messages over HTTP, keeps per-thread conversation history,
//! and returns the model's reply either as one JSON document or as a stream
//! of server-sent events.
//!
//! Layout:
//! - `domain` - threads, messages, conversation state
//! - `ports` - model provider and checkpoint store interfaces
//! - `application` - the chat engine and its command/query handlers
//! - `adapters` - Gemini and mock providers, in-memory storage, axum routes
//! - `config` - environment-driven configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
