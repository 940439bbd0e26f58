//! ChatEngine - the single-node conversation graph.
//!
//! A turn runs `load checkpoint -> append user message -> chat_node -> append
//! reply -> save checkpoint` while holding that thread's turn lock. Turns on
//! different threads run concurrently; turns on the same thread are
//! serialized, so a reply is always computed from the history that precedes it.

use async_stream::stream;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::errors::ChatError;
use crate::domain::{ChatMessage, ChatState, ThreadId};
use crate::ports::{AIProvider, CheckpointStore, CompletionRequest, ProviderInfo};

/// Text fragments of a reply, in generation order.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Runs conversation turns against the model and persists thread state.
pub struct ChatEngine {
    ai_provider: Arc<dyn AIProvider>,
    checkpoints: Arc<dyn CheckpointStore>,
    system_prompt: Option<String>,
    temperature: Option<f32>,
    turn_locks: Mutex<HashMap<ThreadId, Arc<Mutex<()>>>>,
}

impl ChatEngine {
    /// Creates an engine over the given provider and checkpoint store.
    pub fn new(ai_provider: Arc<dyn AIProvider>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            ai_provider,
            checkpoints,
            system_prompt: None,
            temperature: None,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the system prompt sent with every turn.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    /// Sets the sampling temperature sent with every turn.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Provider name and model, for health reporting.
    pub fn provider_info(&self) -> ProviderInfo {
        self.ai_provider.provider_info()
    }

    /// Runs one complete turn and returns the assistant's reply.
    pub async fn invoke(&self, thread: &ThreadId, text: &str) -> Result<ChatMessage, ChatError> {
        let started = Instant::now();
        let _turn = self.lock_thread(thread).await;

        let mut state = self.load_state(thread).await?;
        state.push(ChatMessage::user(text));

        let request = self.build_request(&state);
        let trace_id = request.trace_id.clone();
        let response = self.ai_provider.complete(request).await.map_err(|err| {
            tracing::warn!(
                thread_id = %thread,
                trace_id = %trace_id,
                error = %err,
                retryable = err.is_retryable(),
                "Model call failed"
            );
            ChatError::from(err)
        })?;

        let reply = ChatMessage::assistant(response.content);
        state.push(reply.clone());
        self.checkpoints.save(thread, &state).await?;

        tracing::info!(
            thread_id = %thread,
            trace_id = %trace_id,
            message_len = text.len(),
            reply_len = reply.content.len(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chat turn completed"
        );

        Ok(reply)
    }

    /// Starts a streaming turn.
    ///
    /// The returned stream owns the thread's turn lock until it finishes or is
    /// dropped. The turn is saved only when the upstream stream ends cleanly;
    /// after an error nothing further is yielded and nothing is persisted.
    pub async fn stream(&self, thread: &ThreadId, text: &str) -> Result<TokenStream, ChatError> {
        let started = Instant::now();
        let turn = self.lock_thread(thread).await;

        let mut state = self.load_state(thread).await?;
        state.push(ChatMessage::user(text));

        let request = self.build_request(&state);
        let trace_id = request.trace_id.clone();
        let mut upstream = self.ai_provider.stream_complete(request).await?;

        let checkpoints = Arc::clone(&self.checkpoints);
        let thread = thread.clone();
        let message_len = text.len();

        let tokens = stream! {
            let _turn = turn;
            let mut reply = String::new();

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(chunk) => {
                        let last = chunk.is_final();
                        if !chunk.delta.is_empty() {
                            reply.push_str(&chunk.delta);
                            yield Ok(chunk.delta);
                        }
                        if last {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            thread_id = %thread,
                            trace_id = %trace_id,
                            error = %err,
                            partial_len = reply.len(),
                            "Model stream failed, turn discarded"
                        );
                        yield Err(ChatError::from(err));
                        return;
                    }
                }
            }

            let reply_len = reply.len();
            state.push(ChatMessage::assistant(reply));
            if let Err(err) = checkpoints.save(&thread, &state).await {
                tracing::error!(thread_id = %thread, error = %err, "Failed to save checkpoint");
                yield Err(ChatError::from(err));
                return;
            }

            tracing::info!(
                thread_id = %thread,
                trace_id = %trace_id,
                message_len,
                reply_len,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Streaming chat turn completed"
            );
        };

        Ok(Box::pin(tokens))
    }

    /// Returns the stored history of a thread (empty if never used).
    pub async fn history(&self, thread: &ThreadId) -> Result<ChatState, ChatError> {
        self.load_state(thread).await
    }

    /// Clears a thread. Waits for any in-flight turn on it to finish first.
    pub async fn reset(&self, thread: &ThreadId) -> Result<(), ChatError> {
        let _turn = self.lock_thread(thread).await;
        self.checkpoints.delete(thread).await?;
        tracing::info!(thread_id = %thread, "Thread reset");
        Ok(())
    }

    async fn lock_thread(&self, thread: &ThreadId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            // Entries only the map refers to have no holder and no waiter.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(thread.clone()).or_default())
        };
        lock.lock_owned().await
    }

    async fn load_state(&self, thread: &ThreadId) -> Result<ChatState, ChatError> {
        Ok(self.checkpoints.load(thread).await?.unwrap_or_default())
    }

    /// chat_node input: the whole thread history plus engine settings.
    fn build_request(&self, state: &ChatState) -> CompletionRequest {
        let mut request =
            CompletionRequest::new(Uuid::new_v4().to_string()).with_history(state.messages());
        if let Some(prompt) = &self.system_prompt {
            request = request.with_system_prompt(prompt.clone());
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }
}
