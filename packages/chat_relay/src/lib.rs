//! Chat relay server library.
//!
//! Correlates asynchronous AI response fragments (delivered by HTTP
//! callback) with the WebSocket connections subscribed to the owning chat,
//! and streams them out in order. All stream state is in memory; a message
//! lives in the store from creation until the sweeper purges it.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod ai;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod ws;

use crate::ai::AiClient;
use crate::auth::TokenValidator;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::metrics::ServerMetrics;
use crate::registry::ConnectionRegistry;
use crate::store::StreamStore;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
pub struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub store: Arc<StreamStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub ai: Arc<AiClient>,
    pub validator: Arc<dyn TokenValidator>,
    /// Server runtime configuration
    pub server_config: Arc<ServerConfig>,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
}

/// Build the full application router with tracing and CORS layers applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ws/chat/{chat_id}", get(handlers::chat_websocket_handler))
        .route(
            "/api/chats/{chat_id}/messages",
            post(handlers::create_message_handler),
        )
        .route(
            "/api/chats/{chat_id}/messages/{message_id}",
            get(handlers::get_message_handler),
        )
        .route(
            "/api/chats/{chat_id}/messages/{message_id}/callback",
            post(handlers::message_callback_handler),
        )
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/health/ready", get(handlers::health_ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
