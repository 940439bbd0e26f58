//! Data Transfer Objects for the chat endpoints.
//!
//! These types define the wire format on both sides of the relay. Field order
//! of the SSE frame types is part of the contract.

use serde::{Deserialize, Serialize};

use crate::application::RelayFrame;
use crate::domain::{ChatMessage, ChatRole, ChatState, ThreadId};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Form (or query string) carrying a chat message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatForm {
    /// Absent fields are treated as an empty message.
    #[serde(default)]
    pub message: String,
    /// Conversation thread; the configured default when absent or blank.
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Query parameters naming a thread.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadParams {
    #[serde(default)]
    pub thread_id: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of a successful non-streaming turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// One message in a history listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub role: ChatRole,
    pub content: String,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// Stored history of one thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryView {
    pub thread_id: String,
    pub messages: Vec<MessageView>,
}

impl HistoryView {
    pub fn new(thread_id: &ThreadId, state: &ChatState) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            messages: state.messages().iter().map(MessageView::from).collect(),
        }
    }
}

/// Liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub provider: String,
    pub model: String,
}

/// Error body for non-streaming failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retryable: None,
        }
    }

    pub fn upstream(error: impl Into<String>, retryable: bool) -> Self {
        Self {
            error: error.into(),
            retryable: Some(retryable),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SSE Frames
// ════════════════════════════════════════════════════════════════════════════════

/// JSON payload of one `data:` line on the streaming endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SseFrame {
    /// `{"token":"…","partial":true}`
    Partial { token: String, partial: bool },
    /// `{"token":"","partial":false,"complete":true}`
    Complete {
        token: String,
        partial: bool,
        complete: bool,
    },
    /// `{"error":"…","complete":true,"kind":"…","retryable":…}`
    Failed {
        error: String,
        complete: bool,
        kind: &'static str,
        retryable: bool,
    },
}

impl From<RelayFrame> for SseFrame {
    fn from(frame: RelayFrame) -> Self {
        match frame {
            RelayFrame::Partial { token } => SseFrame::Partial {
                token,
                partial: true,
            },
            RelayFrame::Complete => SseFrame::Complete {
                token: String::new(),
                partial: false,
                complete: true,
            },
            RelayFrame::Failed {
                error,
                kind,
                retryable,
            } => SseFrame::Failed {
                error,
                complete: true,
                kind,
                retryable,
            },
        }
    }
}
