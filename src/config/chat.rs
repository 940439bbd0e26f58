//! Chat relay behavior configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::ThreadId;

/// Chat relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Thread used when a request does not name one
    #[serde(default = "default_thread_id")]
    pub default_thread_id: String,

    /// Pause after each streamed fragment, in milliseconds (0 disables)
    #[serde(default = "default_stream_delay")]
    pub stream_delay_ms: u64,
}

impl ChatConfig {
    /// Get the stream pacing delay as a Duration
    pub fn stream_delay(&self) -> Duration {
        Duration::from_millis(self.stream_delay_ms)
    }

    /// Parse the configured default thread id
    pub fn default_thread(&self) -> Result<ThreadId, ValidationError> {
        ThreadId::new(&self.default_thread_id)
            .map_err(|e| ValidationError::InvalidThreadId(e.to_string()))
    }

    /// Validate chat configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.default_thread()?;
        if self.stream_delay_ms > 1000 {
            return Err(ValidationError::StreamDelayTooLarge);
        }
        Ok(())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_thread_id: default_thread_id(),
            stream_delay_ms: default_stream_delay(),
        }
    }
}

fn default_thread_id() -> String {
    "1".to_string()
}

fn default_stream_delay() -> u64 {
    10
}
