//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps and validation errors used across the relay.

mod errors;
mod ids;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{MessageId, ThreadId, MAX_THREAD_ID_LENGTH};
pub use timestamp::Timestamp;
