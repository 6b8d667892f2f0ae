use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::AppState;
use crate::ws;

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    token: String,
}

/// Chat WebSocket endpoint. The token is carried in the query string because
/// browser WebSocket clients cannot set headers; it is validated before the
/// upgrade so an unauthorized client never reaches the protocol loop.
pub async fn chat_websocket_handler(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(claims) = state.validator.validate(&query.token) else {
        warn!(chat_id = %chat_id, "rejected chat connection with invalid token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    tracing::debug!(chat_id = %chat_id, subject = %claims.subject, "chat connection authorized");
    ws.on_upgrade(move |socket| ws::handle_chat_ws(socket, chat_id, state))
}
