use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::RelayError;
use crate::store::SourceRef;

/// One fragment (or terminal marker) of an AI response, posted by the AI
/// service to the callback URL it was handed at submission.
#[derive(Debug, Deserialize)]
pub struct CallbackPayload {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_final: bool,
    /// Source documents the response drew on. Only meaningful on the final
    /// callback.
    #[serde(default, alias = "context_used")]
    pub sources: Vec<CallbackSource>,
    /// Present when the AI service failed to produce a response.
    #[serde(default)]
    pub error: Option<String>,
}

/// Loosely-shaped source document as the AI service reports it. Field names
/// vary by retrieval backend, so everything is optional and normalized in
/// [`CallbackSource::into_source`].
#[derive(Debug, Deserialize)]
pub struct CallbackSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl CallbackSource {
    /// Normalize to the wire shape: `source` wins over `title` for the
    /// display name, `url` over `id` for the link, `content` over `page`
    /// for the excerpt.
    pub fn into_source(self) -> SourceRef {
        SourceRef {
            title: self.source.or(self.title).unwrap_or_default(),
            url: self.url.or(self.id).unwrap_or_default(),
            content: self.content.or(self.page),
        }
    }
}

fn success() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "success" }))
}

/// Ingest one callback from the AI service and fan the result out to every
/// connection attached to the chat.
///
/// Callbacks for unknown messages (expired, purged, or never created) and
/// late callbacks for terminal messages are acknowledged with 200 and
/// otherwise ignored, so a slow AI service retrying a finished message
/// cannot disturb buffered state.
pub async fn message_callback_handler(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<CallbackPayload>,
) -> Json<serde_json::Value> {
    state.metrics.callback_received();

    let known = state
        .store
        .get(message_id)
        .await
        .is_some_and(|s| s.chat_id == chat_id);
    if !known {
        debug!(chat_id = %chat_id, message_id = %message_id, "callback for unknown message ignored");
        state.metrics.callback_ignored();
        return success();
    }

    if let Some(reason) = payload.error {
        match state.store.fail(message_id, reason).await {
            Ok(()) => {
                info!(message_id = %message_id, "message errored by AI service");
                state.metrics.message_failed();
            }
            Err(RelayError::AlreadyTerminal(_)) => {
                state.metrics.callback_ignored();
                return success();
            }
            Err(e) => {
                warn!(message_id = %message_id, "callback error ingestion failed: {}", e);
                state.metrics.callback_ignored();
                return success();
            }
        }
        state.dispatcher.publish(message_id).await;
        return success();
    }

    if !payload.content.is_empty() {
        match state.store.append_fragment(message_id, payload.content).await {
            Ok(()) => {}
            Err(RelayError::AlreadyTerminal(_)) => {
                state.metrics.callback_ignored();
                return success();
            }
            Err(e) => {
                warn!(message_id = %message_id, "fragment ingestion failed: {}", e);
                state.metrics.callback_ignored();
                return success();
            }
        }
    }

    if payload.is_final {
        let sources = payload
            .sources
            .into_iter()
            .map(CallbackSource::into_source)
            .collect();
        match state.store.complete(message_id, sources).await {
            Ok(()) => {
                info!(message_id = %message_id, "message complete");
                state.metrics.message_completed();
            }
            Err(RelayError::AlreadyTerminal(_)) => {
                state.metrics.callback_ignored();
                return success();
            }
            Err(e) => {
                warn!(message_id = %message_id, "completion ingestion failed: {}", e);
            }
        }
    }

    state.dispatcher.publish(message_id).await;
    success()
}
