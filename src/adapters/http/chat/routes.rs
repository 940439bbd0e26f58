//! Axum routes for chat endpoints.
//!
//! Defines the routing table and the middleware stack.

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

use super::handlers::{
    get_history, health, index, reset_history, send_message, stream_message_form,
    stream_message_query, ChatAppState,
};

/// Creates routes for chat endpoints.
///
/// - GET / - chat page
/// - POST / - same as POST /api/chat
/// - POST /api/chat - one full turn, JSON reply
/// - GET|POST /api/chat/stream - one turn streamed as server-sent events
/// - GET|DELETE /api/chat/history - read or clear a thread
/// - GET /health - liveness
pub fn chat_routes() -> Router<ChatAppState> {
    Router::new()
        .route("/", get(index).post(send_message))
        .route("/api/chat", post(send_message))
        .route(
            "/api/chat/stream",
            get(stream_message_query).post(stream_message_form),
        )
        .route("/api/chat/history", get(get_history).delete(reset_history))
        .route("/health", get(health))
}

/// Full application router: routes, state, and middleware.
pub fn chat_router(state: ChatAppState, server: &ServerConfig) -> Router {
    let mut router = chat_routes()
        .with_state(state)
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    if let Some(cors) = cors_layer(&server.allowed_origins()) {
        router = router.layer(cors);
    }

    router
}

/// Builds a CORS layer from configured origins. `*` allows any origin.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(layer.allow_origin(AllowOrigin::list(allowed)))
}
