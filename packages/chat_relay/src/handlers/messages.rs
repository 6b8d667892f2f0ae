use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::AppState;
use crate::ai::HistoryEntry;
use crate::store::{SourceRef, StreamState};

// Shown to clients when the AI service cannot be reached; the real cause
// goes to the logs.
const SUBMIT_FAILED_MESSAGE: &str =
    "Sorry, I'm having trouble processing your request right now. Please try again later.";

#[derive(Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
}

#[derive(Serialize)]
pub struct CreateMessageResponse {
    pub message_id: Uuid,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message_id: Uuid,
    pub chat_id: Uuid,
    pub content: String,
    pub state: StreamState,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Accept a user message, register its stream buffer, and hand it to the AI
/// service. Responds as soon as the buffer exists; the submission itself is
/// asynchronous and a failure surfaces as an errored stream, not an HTTP
/// error.
pub async fn create_message_handler(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<Json<CreateMessageResponse>, (StatusCode, String)> {
    let message_id = Uuid::new_v4();
    state
        .store
        .create(message_id, chat_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    state.metrics.message_created();
    info!(chat_id = %chat_id, message_id = %message_id, "message accepted");

    let ai = state.ai.clone();
    let store = state.store.clone();
    let dispatcher = state.dispatcher.clone();
    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        let callback_url = ai.callback_url(chat_id, message_id);
        if let Err(e) = ai
            .submit(&req.content, &req.conversation_history, &callback_url)
            .await
        {
            error!(message_id = %message_id, "AI submission failed: {:#}", e);
            if store
                .fail(message_id, SUBMIT_FAILED_MESSAGE.to_string())
                .await
                .is_ok()
            {
                metrics.message_failed();
                dispatcher.publish(message_id).await;
            }
        }
    });

    Ok(Json(CreateMessageResponse {
        message_id,
        status: "pending",
    }))
}

/// Current accumulated state of one message. 404 once the message is purged
/// or was never created.
pub async fn get_message_handler(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
) -> Response {
    match state.store.get(message_id).await {
        Some(snap) if snap.chat_id == chat_id => Json(MessageResponse {
            message_id: snap.message_id,
            chat_id: snap.chat_id,
            content: snap.full_content(),
            state: snap.state,
            sources: snap.sources,
            error: snap.error,
        })
        .into_response(),
        _ => (StatusCode::NOT_FOUND, "message not found".to_string()).into_response(),
    }
}
