use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.snapshot();

    Json(serde_json::json!({
        "status": "healthy",
        "connections": metrics.connections.active,
        "uptime_secs": metrics.uptime_secs,
    }))
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness probe - returns 200 once routing and shared state are up. The
/// relay keeps all state in memory, so live and ready coincide.
pub async fn health_ready_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ready" }))
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
