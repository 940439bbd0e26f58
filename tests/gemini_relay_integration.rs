//! End-to-end tests of the relay backed by the Gemini provider.
//!
//! A local axum server plays the Generative Language API; the relay router
//! is driven in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use chat_relay::adapters::ai::{GeminiConfig, GeminiProvider};
use chat_relay::adapters::http::{chat_router, ChatAppState};
use chat_relay::adapters::storage::InMemoryCheckpointStore;
use chat_relay::application::ChatEngine;
use chat_relay::config::ServerConfig;
use chat_relay::domain::ThreadId;

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Starts a fake model endpoint that answers every request with `body`.
async fn fake_gemini(status: StatusCode, body: &'static str) -> String {
    let router = Router::new().fallback(move || async move {
        (status, [(header::CONTENT_TYPE, "text/event-stream")], body)
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn relay(base_url: &str) -> Router {
    let provider = GeminiProvider::new(
        GeminiConfig::new("test-key")
            .with_base_url(base_url)
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(0),
    )
    .unwrap();
    let engine = ChatEngine::new(Arc::new(provider), Arc::new(InMemoryCheckpointStore::new()));
    let state = ChatAppState::new(
        Arc::new(engine),
        ThreadId::new("1").unwrap(),
        Duration::ZERO,
    );
    chat_router(state, &ServerConfig::default())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn sse_frames(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|event| {
            event
                .lines()
                .find_map(|line| line.strip_prefix("data:"))
                .map(|data| serde_json::from_str(data.trim_start()).expect("frame JSON"))
        })
        .collect()
}

async fn message_count(app: &Router) -> usize {
    let response = app
        .clone()
        .oneshot(get("/api/chat/history?thread_id=1"))
        .await
        .unwrap();
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    json["messages"].as_array().unwrap().len()
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn safety_stop_mid_stream_fails_turn_and_saves_nothing() {
    let base = fake_gemini(
        StatusCode::OK,
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Here is \"}]}}]}\r\n\r\n\
         data: {\"candidates\":[{\"content\":{\"parts\":[]},\"finishReason\":\"SAFETY\"}]}\r\n\r\n",
    )
    .await;
    let app = relay(&base);

    let response = app
        .clone()
        .oneshot(get("/api/chat/stream?message=tell%20me"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let frames = sse_frames(&body_text(response).await);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["token"], "Here is ");
    assert_eq!(frames[1]["complete"], true);
    assert_eq!(frames[1]["kind"], "upstream");
    assert_eq!(frames[1]["retryable"], false);
    assert!(frames[1]["error"].as_str().unwrap().contains("SAFETY"));

    assert_eq!(message_count(&app).await, 0);
}

#[tokio::test]
async fn clean_stream_is_saved() {
    let base = fake_gemini(
        StatusCode::OK,
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"All \"}]}}]}\n\n\
         data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"good\"}]},\"finishReason\":\"STOP\"}]}\n\n",
    )
    .await;
    let app = relay(&base);

    let response = app
        .clone()
        .oneshot(get("/api/chat/stream?message=status"))
        .await
        .unwrap();

    let frames = sse_frames(&body_text(response).await);
    assert_eq!(frames[0]["token"], "All ");
    assert_eq!(frames[1]["token"], "good");
    assert_eq!(
        frames.last().unwrap(),
        &serde_json::json!({"token": "", "partial": false, "complete": true})
    );
    assert_eq!(message_count(&app).await, 2);
}

// =============================================================================
// Non-streaming
// =============================================================================

#[tokio::test]
async fn safety_stop_with_text_is_upstream_error() {
    let base = fake_gemini(
        StatusCode::OK,
        r#"{"candidates":[{"content":{"parts":[{"text":"partial"}]},"finishReason":"SAFETY"}]}"#,
    )
    .await;
    let app = relay(&base);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("message=hi"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["retryable"], false);
    assert_eq!(message_count(&app).await, 0);
}
