//! Gemini Provider - Implementation of AIProvider for Google's Generative Language API.
//!
//! # Configuration
//!
//! ```ignore
//! let config = GeminiConfig::new(api_key)
//!     .with_model("gemini-2.5-flash")
//!     .with_base_url("https://generativelanguage.googleapis.com/v1beta");
//!
//! let provider = GeminiProvider::new(config)?;
//! ```
//!
//! # Streaming
//!
//! `streamGenerateContent?alt=sse` returns Server-Sent Events whose `data:`
//! payloads are complete `GenerateContentResponse` objects. Network reads may
//! split a frame anywhere, so bytes are buffered until a full line arrives.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AiConfig;
use crate::ports::{
    AIError, AIProvider, ChunkStream, CompletionRequest, CompletionResponse, FinishReason,
    MessageRole, ProviderInfo, StreamChunk, TokenUsage,
};

/// Configuration for the Gemini provider.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`.
    api_key: Secret<String>,
    /// Model to use (e.g., "gemini-2.5-flash").
    pub model: String,
    /// Base URL for the API, without trailing slash.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries on transient failures (non-streaming only).
    pub max_retries: u32,
}

impl GeminiConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }

    /// Builds provider configuration from validated application config.
    ///
    /// Returns `None` when no API key is configured.
    pub fn from_app_config(config: &AiConfig) -> Option<Self> {
        let key = config.api_key.as_ref()?;
        Some(
            Self::new(key.expose_secret().clone())
                .with_model(config.model.clone())
                .with_base_url(config.base_url.clone())
                .with_timeout(config.timeout())
                .with_max_retries(config.max_retries),
        )
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// Gemini API provider implementation.
pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    /// Creates a new Gemini provider with the given configuration.
    pub fn new(config: GeminiConfig) -> Result<Self, AIError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AIError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, self.config.model
        )
    }

    /// Converts our request to Gemini's format.
    fn to_gemini_request(request: &CompletionRequest) -> GeminiRequest {
        let contents = request
            .messages
            .iter()
            .map(|msg| GeminiContent {
                role: Some(
                    match msg.role {
                        MessageRole::User => "user",
                        MessageRole::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: Some(msg.content.clone()),
                }],
            })
            .collect();

        let system_instruction = request.system_prompt.as_ref().map(|prompt| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(prompt.clone()),
            }],
        });

        let generation_config = if request.temperature.is_some() || request.max_tokens.is_some()
        {
            Some(GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            })
        } else {
            None
        };

        GeminiRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }

    async fn send(&self, url: String, request: &CompletionRequest) -> Result<Response, AIError> {
        let body = Self::to_gemini_request(request);

        tracing::debug!(
            trace_id = %request.trace_id,
            model = %self.config.model,
            messages = request.messages.len(),
            "Sending Gemini request"
        );

        self.client
            .post(url)
            .header("x-goog-api-key", self.config.api_key())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))
    }

    fn map_transport_error(&self, e: reqwest::Error) -> AIError {
        if e.is_timeout() {
            AIError::Timeout {
                timeout_secs: self.config.timeout.as_secs() as u32,
            }
        } else if e.is_connect() {
            AIError::network(format!("Connection failed: {}", e))
        } else {
            AIError::network(e.to_string())
        }
    }

    /// Parses the API response status and handles errors.
    async fn handle_response_status(response: Response) -> Result<Response, AIError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &error_body))
    }

    /// Parses a non-streaming response.
    async fn parse_response(&self, response: Response) -> Result<CompletionResponse, AIError> {
        let response = Self::handle_response_status(response).await?;

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AIError::parse(format!("Failed to parse response: {}", e)))?;

        into_completion(body, &self.config.model)
    }
}

#[async_trait]
impl AIProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError> {
        let mut last_error = AIError::network("No attempts made");
        let mut retry_count = 0;

        while retry_count <= self.config.max_retries {
            let attempt = match self.send(self.generate_url(), &request).await {
                Ok(response) => self.parse_response(response).await,
                Err(err) => Err(err),
            };

            match attempt {
                Ok(completion) => return Ok(completion),
                Err(err) => {
                    if !err.is_retryable() || retry_count >= self.config.max_retries {
                        return Err(err);
                    }
                    tracing::warn!(
                        trace_id = %request.trace_id,
                        attempt = retry_count + 1,
                        error = %err,
                        "Gemini request failed, retrying"
                    );
                    last_error = err;
                }
            }

            // Exponential backoff: 1s, 2s, 4s, ...
            sleep(Duration::from_secs(1 << retry_count)).await;
            retry_count += 1;
        }

        Err(last_error)
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<ChunkStream, AIError> {
        let response = self.send(self.stream_url(), &request).await?;
        let response = Self::handle_response_status(response).await?;

        let mut bytes_stream = response.bytes_stream();

        let chunks = stream! {
            let mut parser = SseLineBuffer::default();
            let mut finished = false;

            while let Some(next) = bytes_stream.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(AIError::network(format!("Stream error: {}", e)));
                        return;
                    }
                };

                for item in parser.push(&bytes) {
                    let failed = item.is_err();
                    if matches!(&item, Ok(chunk) if chunk.is_final()) {
                        finished = true;
                    }
                    yield item;
                    if failed {
                        return;
                    }
                }
            }

            for item in parser.finish() {
                if matches!(&item, Ok(chunk) if chunk.is_final()) {
                    finished = true;
                }
                yield item;
            }

            if !finished {
                yield Ok(StreamChunk::final_chunk(FinishReason::Stop, TokenUsage::default()));
            }
        };

        Ok(Box::pin(chunks))
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new("gemini", &self.config.model)
    }
}

/// Maps an HTTP error status and body to a provider error.
fn status_error(status: u16, body: &str) -> AIError {
    let message = error_message(body);
    match status {
        401 | 403 => AIError::AuthenticationFailed,
        429 => AIError::rate_limited(parse_retry_after(body)),
        400 | 404 => AIError::InvalidRequest(message),
        500..=599 => AIError::unavailable(format!("Server error {}: {}", status, message)),
        _ => AIError::network(format!("Unexpected status {}: {}", status, message)),
    }
}

/// Extracts `error.message` from a Google API error body, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error.message)
        .unwrap_or_else(|| body.to_string())
}

/// Reads the `RetryInfo.retryDelay` detail (e.g. "17s"), defaulting to 30 seconds.
fn parse_retry_after(body: &str) -> u32 {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|parsed| {
            parsed
                .error
                .details
                .into_iter()
                .find_map(|detail| detail.retry_delay)
        })
        .and_then(|delay| delay.trim_end_matches('s').parse::<f64>().ok())
        .map(|secs| secs.ceil() as u32)
        .unwrap_or(30)
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        _ => FinishReason::Other,
    }
}

fn candidate_text(candidate: &Candidate) -> String {
    candidate
        .content
        .as_ref()
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn usage_of(metadata: Option<&UsageMetadata>) -> TokenUsage {
    metadata
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
        .unwrap_or_default()
}

/// Converts a full `generateContent` body into a completion.
fn into_completion(
    body: GenerateContentResponse,
    model: &str,
) -> Result<CompletionResponse, AIError> {
    if let Some(reason) = body
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_ref())
    {
        return Err(AIError::content_filtered(format!("prompt blocked: {}", reason)));
    }

    let candidate = body
        .candidates
        .first()
        .ok_or_else(|| AIError::parse("No candidates in response"))?;

    let finish_reason = candidate
        .finish_reason
        .as_deref()
        .map(map_finish_reason)
        .unwrap_or(FinishReason::Stop);

    if finish_reason == FinishReason::ContentFilter {
        return Err(AIError::content_filtered(
            candidate.finish_reason.clone().unwrap_or_default(),
        ));
    }
    let content = candidate_text(candidate);

    Ok(CompletionResponse {
        content,
        usage: usage_of(body.usage_metadata.as_ref()),
        model: body.model_version.unwrap_or_else(|| model.to_string()),
        finish_reason,
    })
}

/// Converts one streamed event payload into zero or more chunks.
fn event_chunks(data: &str) -> Vec<Result<StreamChunk, AIError>> {
    let body: GenerateContentResponse = match serde_json::from_str(data) {
        Ok(body) => body,
        Err(e) => {
            return vec![Err(AIError::parse(format!(
                "Failed to parse SSE chunk: {}",
                e
            )))]
        }
    };

    if let Some(reason) = body
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_ref())
    {
        return vec![Err(AIError::content_filtered(format!(
            "prompt blocked: {}",
            reason
        )))];
    }

    let mut results = Vec::new();
    if let Some(candidate) = body.candidates.first() {
        let text = candidate_text(candidate);
        if !text.is_empty() {
            results.push(Ok(StreamChunk::content(text)));
        }
        if let Some(reason) = candidate.finish_reason.as_deref() {
            let finish = map_finish_reason(reason);
            if finish == FinishReason::ContentFilter {
                // A filtered reply is truncated, never a clean end.
                results.push(Err(AIError::content_filtered(reason)));
            } else {
                results.push(Ok(StreamChunk::final_chunk(
                    finish,
                    usage_of(body.usage_metadata.as_ref()),
                )));
            }
        }
    }
    results
}

/// Accumulates raw bytes and yields chunks for every complete `data:` line.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
    /// Bytes of `pending` already known to hold no newline.
    scanned: usize,
}

/// Largest unterminated line the parser holds before giving up.
const MAX_PENDING_BYTES: usize = 1024 * 1024;

impl SseLineBuffer {
    /// Appends bytes and parses every complete line.
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamChunk, AIError>> {
        self.pending.extend_from_slice(bytes);

        let mut results = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset + 1;
            results.extend(Self::parse_line(&self.pending[start..end]));
            start = end;
            from = end;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();

        if self.pending.len() > MAX_PENDING_BYTES {
            self.pending.clear();
            self.scanned = 0;
            results.push(Err(AIError::parse(format!(
                "SSE line exceeds {} bytes",
                MAX_PENDING_BYTES
            ))));
        }
        results
    }

    /// Parses whatever remains once the body ends without a trailing newline.
    fn finish(&mut self) -> Vec<Result<StreamChunk, AIError>> {
        let rest = std::mem::take(&mut self.pending);
        self.scanned = 0;
        Self::parse_line(&rest)
    }

    fn parse_line(line: &[u8]) -> Vec<Result<StreamChunk, AIError>> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches(['\r', '\n']);
        match text.strip_prefix("data:") {
            Some(data) if !data.trim().is_empty() => event_chunks(data.trim_start()),
            _ => Vec::new(),
        }
    }
}

// ----- Gemini API Types -----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(default)]
    details: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorDetail {
    retry_delay: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder_works() {
        let config = GeminiConfig::new("test-key")
            .with_model("gemini-2.5-pro")
            .with_base_url("https://custom.api.com/v1/")
            .with_timeout(Duration::from_secs(30))
            .with_max_retries(5);

        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.base_url, "https://custom.api.com/v1");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.api_key(), "test-key");
    }

    #[test]
    fn config_debug_hides_key() {
        let config = GeminiConfig::new("super-secret");
        assert!(!format!("{:?}", config).contains("super-secret"));
    }

    #[test]
    fn from_app_config_requires_key() {
        let mut app = AiConfig::default();
        assert!(GeminiConfig::from_app_config(&app).is_none());

        app.api_key = Some(Secret::new("k".to_string()));
        app.model = "gemini-x".to_string();
        let config = GeminiConfig::from_app_config(&app).unwrap();
        assert_eq!(config.model, "gemini-x");
        assert_eq!(config.api_key(), "k");
    }

    #[test]
    fn urls_include_model_and_sse_flag() {
        let provider = GeminiProvider::new(
            GeminiConfig::new("k").with_base_url("http://localhost:9999/v1beta"),
        )
        .unwrap();

        assert_eq!(
            provider.generate_url(),
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            provider.stream_url(),
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn provider_info_reports_gemini() {
        let provider = GeminiProvider::new(GeminiConfig::new("k")).unwrap();
        let info = provider.provider_info();
        assert_eq!(info.name, "gemini");
        assert_eq!(info.model, "gemini-2.5-flash");
    }

    #[test]
    fn request_maps_roles_and_system_instruction() {
        let request = CompletionRequest::new("t")
            .with_message(MessageRole::User, "hi")
            .with_message(MessageRole::Assistant, "hello")
            .with_system_prompt("be brief")
            .with_temperature(0.5);

        let json = serde_json::to_value(GeminiProvider::to_gemini_request(&request)).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][1]["parts"][0]["text"], "hello");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["temperature"], 0.5);
        assert!(json["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn request_without_options_omits_config() {
        let request = CompletionRequest::new("t").with_message(MessageRole::User, "hi");
        let json = serde_json::to_value(GeminiProvider::to_gemini_request(&request)).unwrap();

        assert!(json.get("systemInstruction").is_none());
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn status_errors_map_to_variants() {
        assert_eq!(status_error(401, ""), AIError::AuthenticationFailed);
        assert_eq!(status_error(403, ""), AIError::AuthenticationFailed);
        assert!(matches!(status_error(400, "bad"), AIError::InvalidRequest(_)));
        assert!(matches!(status_error(503, ""), AIError::Unavailable { .. }));
        assert!(matches!(status_error(418, ""), AIError::Network(_)));
    }

    #[test]
    fn invalid_request_uses_api_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            status_error(400, body),
            AIError::InvalidRequest("API key not valid.".to_string())
        );
    }

    #[test]
    fn parse_retry_after_from_details() {
        let body = r#"{"error":{"code":429,"message":"quota","details":[{"@type":"type.googleapis.com/google.rpc.QuotaFailure"},{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"17s"}]}}"#;
        assert_eq!(status_error(429, body), AIError::rate_limited(17));
    }

    #[test]
    fn parse_retry_after_default() {
        assert_eq!(parse_retry_after("not json"), 30);
    }

    #[test]
    fn completion_joins_parts_and_usage() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"there"}]},"finishReason":"STOP"}],
                "usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":2,"totalTokenCount":6},
                "modelVersion":"gemini-2.5-flash-001"}"#,
        )
        .unwrap();

        let completion = into_completion(body, "gemini-2.5-flash").unwrap();

        assert_eq!(completion.content, "Hello there");
        assert_eq!(completion.usage, TokenUsage::new(4, 2));
        assert_eq!(completion.model, "gemini-2.5-flash-001");
        assert_eq!(completion.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn completion_blocked_prompt_is_filtered() {
        let body: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();

        let err = into_completion(body, "m").unwrap_err();
        assert!(matches!(err, AIError::ContentFiltered { .. }));
    }

    #[test]
    fn completion_without_candidates_is_parse_error() {
        let body: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(into_completion(body, "m"), Err(AIError::Parse(_))));
    }

    #[test]
    fn sse_content_and_final_chunks() {
        let mut buffer = SseLineBuffer::default();
        let chunks = buffer.push(
            b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\r\n\r\n\
              data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"!\"}]},\"finishReason\":\"MAX_TOKENS\"}],\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":2}}\r\n\r\n",
        );

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_ref().unwrap().delta, "Hi");
        assert_eq!(chunks[1].as_ref().unwrap().delta, "!");
        let last = chunks[2].as_ref().unwrap();
        assert!(last.is_final());
        assert_eq!(last.finish_reason, Some(FinishReason::Length));
        assert_eq!(last.usage, Some(TokenUsage::new(3, 2)));
    }

    #[test]
    fn sse_frame_split_across_reads() {
        let mut buffer = SseLineBuffer::default();
        let first = buffer.push(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"te");
        assert!(first.is_empty());

        let second = buffer.push(b"xt\":\"split\"}]}}]}\n\n");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].as_ref().unwrap().delta, "split");
    }

    #[test]
    fn sse_trailing_line_without_newline() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer
            .push(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"end\"}]}}]}")
            .is_empty());

        let rest = buffer.finish();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].as_ref().unwrap().delta, "end");
    }

    #[test]
    fn sse_ignores_comments_and_blank_lines() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b": keep-alive\n\nevent: message\n").is_empty());
    }

    #[test]
    fn sse_empty_text_is_not_emitted() {
        let chunks = event_chunks(r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#);
        assert!(chunks.is_empty());
    }

    #[test]
    fn sse_invalid_json_is_parse_error() {
        let chunks = event_chunks("{not json");
        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Err(AIError::Parse(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let provider = GeminiProvider::new(
            GeminiConfig::new("k")
                .with_base_url("http://127.0.0.1:9")
                .with_max_retries(0),
        )
        .unwrap();

        let request = CompletionRequest::new("t").with_message(MessageRole::User, "hi");
        let err = provider.complete(request).await.unwrap_err();

        assert!(err.is_retryable());
    }

    #[test]
    fn completion_safety_stop_is_filtered_even_with_text() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"partial"}]},"finishReason":"SAFETY"}]}"#,
        )
        .unwrap();

        let err = into_completion(body, "m").unwrap_err();
        assert_eq!(err, AIError::content_filtered("SAFETY"));
    }

    #[test]
    fn completion_recitation_without_text_is_filtered() {
        let body: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"RECITATION"}]}"#,
        )
        .unwrap();

        assert!(matches!(
            into_completion(body, "m"),
            Err(AIError::ContentFiltered { .. })
        ));
    }

    #[test]
    fn sse_safety_stop_follows_text_with_error() {
        let chunks = event_chunks(
            r#"{"candidates":[{"content":{"parts":[{"text":"so far"}]},"finishReason":"SAFETY"}]}"#,
        );

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap().delta, "so far");
        assert_eq!(
            chunks[1].as_ref().unwrap_err(),
            &AIError::content_filtered("SAFETY")
        );
    }

    #[test]
    fn sse_many_small_reads_parse_each_line_once() {
        let mut buffer = SseLineBuffer::default();
        let input = b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n\
                      data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]}}]}\n";

        let mut deltas = Vec::new();
        for byte in input.iter() {
            for chunk in buffer.push(std::slice::from_ref(byte)) {
                deltas.push(chunk.unwrap().delta);
            }
        }

        assert_eq!(deltas, vec!["a", "b"]);
        assert!(buffer.pending.is_empty());
        assert_eq!(buffer.scanned, 0);
    }

    #[test]
    fn sse_oversized_line_is_parse_error() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: ").is_empty());

        let filler = vec![b'x'; MAX_PENDING_BYTES];
        let chunks = buffer.push(&filler);

        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Err(AIError::Parse(_))));
        assert!(buffer.pending.is_empty());
    }

    mod against_local_server {
        use super::*;
        use axum::http::{header, StatusCode};
        use axum::Router;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        /// Serves the scripted replies in order, repeating the last one.
        async fn scripted_server(
            replies: Vec<(StatusCode, &'static str)>,
        ) -> (String, Arc<AtomicUsize>) {
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            let replies = Arc::new(replies);

            let router = Router::new().fallback(move || {
                let counter = counter.clone();
                let replies = replies.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let (status, body) = replies[n.min(replies.len() - 1)];
                    (status, [(header::CONTENT_TYPE, "application/json")], body)
                }
            });

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, router).await.unwrap();
            });

            (format!("http://{}", addr), hits)
        }

        fn provider_for(base_url: &str, max_retries: u32) -> GeminiProvider {
            GeminiProvider::new(
                GeminiConfig::new("k")
                    .with_base_url(base_url)
                    .with_timeout(Duration::from_secs(5))
                    .with_max_retries(max_retries),
            )
            .unwrap()
        }

        fn hello() -> CompletionRequest {
            CompletionRequest::new("t").with_message(MessageRole::User, "hi")
        }

        const OK_BODY: &str =
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"hello"}]},"finishReason":"STOP"}]}"#;
        const UNAVAILABLE_BODY: &str =
            r#"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"#;

        #[tokio::test]
        async fn unavailable_then_ok_retries_once() {
            let (base, hits) = scripted_server(vec![
                (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY),
                (StatusCode::OK, OK_BODY),
            ])
            .await;

            let completion = provider_for(&base, 2).complete(hello()).await.unwrap();

            assert_eq!(completion.content, "hello");
            assert_eq!(hits.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn bad_request_is_not_retried() {
            let (base, hits) = scripted_server(vec![(
                StatusCode::BAD_REQUEST,
                r#"{"error":{"code":400,"message":"bad contents"}}"#,
            )])
            .await;

            let err = provider_for(&base, 3).complete(hello()).await.unwrap_err();

            assert_eq!(err, AIError::InvalidRequest("bad contents".to_string()));
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn forbidden_is_auth_failure() {
            let (base, hits) = scripted_server(vec![(StatusCode::FORBIDDEN, "{}")]).await;

            let err = provider_for(&base, 3).complete(hello()).await.unwrap_err();

            assert_eq!(err, AIError::AuthenticationFailed);
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn streaming_unavailable_is_not_retried() {
            let (base, hits) =
                scripted_server(vec![(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY)]).await;

            let result = provider_for(&base, 3).stream_complete(hello()).await;

            assert!(matches!(result, Err(AIError::Unavailable { .. })));
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn stream_without_finish_reason_gets_final_chunk() {
            let (base, _) = scripted_server(vec![(
                StatusCode::OK,
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"one \"}]}}]}\r\n\r\n\
                 data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"two\"}]}}]}\r\n\r\n",
            )])
            .await;

            let stream = provider_for(&base, 0).stream_complete(hello()).await.unwrap();
            let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;

            assert_eq!(chunks.len(), 3);
            assert_eq!(chunks[0].delta, "one ");
            assert_eq!(chunks[1].delta, "two");
            assert!(chunks[2].is_final());
            assert_eq!(chunks[2].finish_reason, Some(FinishReason::Stop));
        }

        #[tokio::test]
        async fn stream_safety_stop_ends_with_error() {
            let (base, _) = scripted_server(vec![(
                StatusCode::OK,
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"start\"}]},\"finishReason\":\"SAFETY\"}]}\n\n",
            )])
            .await;

            let stream = provider_for(&base, 0).stream_complete(hello()).await.unwrap();
            let items: Vec<Result<StreamChunk, AIError>> = stream.collect().await;

            assert_eq!(items.len(), 2);
            assert_eq!(items[0].as_ref().unwrap().delta, "start");
            assert_eq!(
                items[1].as_ref().unwrap_err(),
                &AIError::content_filtered("SAFETY")
            );
        }
    }
}
