//! StreamMessage command handler.
//!
//! Turns the engine's token stream into relay frames: one `Partial` per
//! non-empty fragment, then exactly one terminal `Complete` or `Failed`.
//! Pacing between partial frames is applied here.

use async_stream::stream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::application::{ChatEngine, ChatError};
use crate::domain::ThreadId;

/// Frame stream produced for one streaming turn.
pub type FrameStream = Pin<Box<dyn Stream<Item = RelayFrame> + Send>>;

/// One unit of a streamed reply as seen by clients.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    /// A non-empty text fragment.
    Partial { token: String },
    /// The reply finished and was saved.
    Complete,
    /// The turn failed; no further frames follow.
    Failed {
        error: String,
        kind: &'static str,
        retryable: bool,
    },
}

impl RelayFrame {
    /// Builds a failure frame from an error.
    pub fn failed(err: &ChatError) -> Self {
        RelayFrame::Failed {
            error: err.public_message(),
            kind: err.kind(),
            retryable: err.is_retryable(),
        }
    }

    /// True for `Complete` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayFrame::Partial { .. })
    }
}

/// Command to stream a reply to a message.
#[derive(Debug, Clone)]
pub struct StreamMessageCommand {
    pub thread_id: ThreadId,
    pub message: String,
}

impl StreamMessageCommand {
    pub fn new(thread_id: ThreadId, message: impl Into<String>) -> Self {
        Self {
            thread_id,
            message: message.into(),
        }
    }
}

/// Handler for streaming chat turns.
#[derive(Clone)]
pub struct StreamMessageHandler {
    engine: Arc<ChatEngine>,
    delay: Duration,
}

impl StreamMessageHandler {
    /// Creates a handler that sleeps `delay` after each partial frame.
    pub fn new(engine: Arc<ChatEngine>, delay: Duration) -> Self {
        Self { engine, delay }
    }

    /// Validates the command and returns the frame stream.
    ///
    /// Only validation fails eagerly. Engine and upstream failures are
    /// reported in-band as a `Failed` frame.
    pub fn handle(&self, cmd: StreamMessageCommand) -> Result<FrameStream, ChatError> {
        let message = cmd.message.trim().to_string();
        if message.is_empty() {
            return Err(ChatError::validation("No message provided"));
        }

        let engine = Arc::clone(&self.engine);
        let delay = self.delay;
        let thread = cmd.thread_id;

        let frames = stream! {
            let mut tokens = match engine.stream(&thread, &message).await {
                Ok(tokens) => tokens,
                Err(err) => {
                    yield RelayFrame::failed(&err);
                    return;
                }
            };

            while let Some(item) = tokens.next().await {
                match item {
                    Ok(token) if token.is_empty() => continue,
                    Ok(token) => {
                        yield RelayFrame::Partial { token };
                        if !delay.is_zero() {
                            sleep(delay).await;
                        }
                    }
                    Err(err) => {
                        yield RelayFrame::failed(&err);
                        return;
                    }
                }
            }

            yield RelayFrame::Complete;
        };

        Ok(Box::pin(frames))
    }
}
