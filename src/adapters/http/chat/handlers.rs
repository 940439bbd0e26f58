//! HTTP handlers for chat endpoints.
//!
//! These handlers connect Axum routes to application layer operations.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, Json, Query, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderName, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{Html, IntoResponse, Response};
use futures::StreamExt;

use crate::application::{
    ChatEngine, ChatError, GetHistoryHandler, GetHistoryQuery, ResetThreadCommand,
    ResetThreadHandler, SendMessageCommand, SendMessageHandler, StreamMessageCommand,
    StreamMessageHandler,
};
use crate::domain::ThreadId;
use crate::ports::ProviderInfo;

use super::dto::{
    ChatForm, ChatResponse, ErrorResponse, HealthResponse, HistoryView, SseFrame, ThreadParams,
};

/// Disables proxy buffering (nginx) so frames reach the client as they are produced.
pub const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

const CHAT_PAGE: &str = include_str!("../../../../templates/chat.html");

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state for chat handlers.
#[derive(Clone)]
pub struct ChatAppState {
    pub send_message: SendMessageHandler,
    pub stream_message: StreamMessageHandler,
    pub get_history: GetHistoryHandler,
    pub reset_thread: ResetThreadHandler,
    /// Thread used when a request names none.
    pub default_thread: ThreadId,
    pub provider: ProviderInfo,
}

impl ChatAppState {
    /// Wires all handlers over one engine.
    pub fn new(engine: Arc<ChatEngine>, default_thread: ThreadId, stream_delay: Duration) -> Self {
        Self {
            send_message: SendMessageHandler::new(Arc::clone(&engine)),
            stream_message: StreamMessageHandler::new(Arc::clone(&engine), stream_delay),
            get_history: GetHistoryHandler::new(Arc::clone(&engine)),
            reset_thread: ResetThreadHandler::new(Arc::clone(&engine)),
            default_thread,
            provider: engine.provider_info(),
        }
    }

    /// Parses a requested thread id, falling back to the default when absent or blank.
    fn resolve_thread(&self, requested: Option<&str>) -> Result<ThreadId, ChatApiError> {
        match requested.map(str::trim).filter(|id| !id.is_empty()) {
            None => Ok(self.default_thread.clone()),
            Some(id) => ThreadId::new(id).map_err(|e| ChatApiError::BadRequest(e.to_string())),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// GET /
// ════════════════════════════════════════════════════════════════════════════════

/// GET / - The chat page.
pub async fn index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

// ════════════════════════════════════════════════════════════════════════════════
// POST / and POST /api/chat
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/chat - Run one turn and return the whole reply.
///
/// The message is passed through as given; an absent field is an empty message.
///
/// # Errors
/// - 400 Bad Request: invalid thread id
/// - 502 Bad Gateway: the model engine failed
/// - 500 Internal Server Error: conversation state unavailable
pub async fn send_message(
    State(state): State<ChatAppState>,
    Form(form): Form<ChatForm>,
) -> Result<Json<ChatResponse>, ChatApiError> {
    let thread_id = state.resolve_thread(form.thread_id.as_deref())?;

    let result = state
        .send_message
        .handle(SendMessageCommand::new(thread_id, form.message))
        .await?;

    Ok(Json(ChatResponse {
        response: result.response,
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// GET|POST /api/chat/stream
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/chat/stream - Stream a reply; message in the query string.
pub async fn stream_message_query(
    State(state): State<ChatAppState>,
    Query(form): Query<ChatForm>,
) -> Result<Response, ChatApiError> {
    stream_reply(&state, form)
}

/// POST /api/chat/stream - Stream a reply; message in the form body.
pub async fn stream_message_form(
    State(state): State<ChatAppState>,
    Form(form): Form<ChatForm>,
) -> Result<Response, ChatApiError> {
    stream_reply(&state, form)
}

/// Builds the SSE response for a streaming turn.
///
/// An empty message is rejected with 400 before any event is written.
/// Afterwards every outcome, failures included, is delivered as a frame.
fn stream_reply(state: &ChatAppState, form: ChatForm) -> Result<Response, ChatApiError> {
    let thread_id = state.resolve_thread(form.thread_id.as_deref())?;

    let frames = state
        .stream_message
        .handle(StreamMessageCommand::new(thread_id, form.message))?;

    let events = frames.map(|frame| Event::default().json_data(SseFrame::from(frame)));

    Ok((
        [(CACHE_CONTROL, "no-cache"), (X_ACCEL_BUFFERING, "no")],
        Sse::new(events),
    )
        .into_response())
}

// ════════════════════════════════════════════════════════════════════════════════
// GET|DELETE /api/chat/history
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/chat/history - Stored messages of a thread, oldest first.
pub async fn get_history(
    State(state): State<ChatAppState>,
    Query(params): Query<ThreadParams>,
) -> Result<Json<HistoryView>, ChatApiError> {
    let thread_id = state.resolve_thread(params.thread_id.as_deref())?;

    let history = state
        .get_history
        .handle(GetHistoryQuery {
            thread_id: thread_id.clone(),
        })
        .await?;

    Ok(Json(HistoryView::new(&thread_id, &history)))
}

/// DELETE /api/chat/history - Forget a thread.
pub async fn reset_history(
    State(state): State<ChatAppState>,
    Query(params): Query<ThreadParams>,
) -> Result<StatusCode, ChatApiError> {
    let thread_id = state.resolve_thread(params.thread_id.as_deref())?;

    state
        .reset_thread
        .handle(ResetThreadCommand { thread_id })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ════════════════════════════════════════════════════════════════════════════════
// GET /health
// ════════════════════════════════════════════════════════════════════════════════

/// GET /health - Liveness plus the configured model.
pub async fn health(State(state): State<ChatAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        provider: state.provider.name.clone(),
        model: state.provider.model.clone(),
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts application errors to HTTP responses.
#[derive(Debug)]
pub enum ChatApiError {
    BadRequest(String),
    Upstream { message: String, retryable: bool },
    Internal(String),
}

impl From<ChatError> for ChatApiError {
    fn from(err: ChatError) -> Self {
        let retryable = err.is_retryable();
        match err {
            ChatError::Validation(msg) => ChatApiError::BadRequest(msg),
            ChatError::Upstream(inner) => ChatApiError::Upstream {
                message: inner.to_string(),
                retryable,
            },
            ChatError::Checkpoint(msg) => ChatApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ChatApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ChatApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            ChatApiError::Upstream { message, retryable } => {
                tracing::warn!(error = %message, retryable, "Upstream model error");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::upstream(message, retryable),
                )
            }
            ChatApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("internal error"),
                )
            }
        };

        (status, Json(error)).into_response()
    }
}
