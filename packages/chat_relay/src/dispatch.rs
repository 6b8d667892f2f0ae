//! Fragment dispatcher.
//!
//! Fans buffered and freshly-ingested fragments out to every connection
//! attached to the owning chat. Each (connection, message) pair carries its
//! own delivery offset, so two connections on the same chat can be at
//! different positions in the same stream and are served independently.
//!
//! Outbound sends are non-blocking: a full or closed per-connection channel
//! drops delivery for that connection only and schedules it for
//! unregistration, never propagating backpressure to callback ingestion.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::metrics::ServerMetrics;
use crate::registry::ConnectionRegistry;
use crate::store::{MessageSnapshot, StreamState, StreamStore};
use crate::ws::protocol::ServerFrame;

/// Terminal frame for a finished message, or `None` while streaming.
fn terminal_frame(snapshot: &MessageSnapshot) -> Option<ServerFrame> {
    match snapshot.state {
        StreamState::Complete => Some(ServerFrame::complete(
            snapshot.message_id,
            snapshot.sources.clone(),
        )),
        StreamState::Errored => Some(ServerFrame::error(format!(
            "message {} failed: {}",
            snapshot.message_id,
            snapshot.error.as_deref().unwrap_or("response failed")
        ))),
        StreamState::Pending | StreamState::Streaming => None,
    }
}

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    store: Arc<StreamStore>,
    metrics: Arc<ServerMetrics>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<StreamStore>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            registry,
            store,
            metrics,
        }
    }

    /// Deliver everything not yet sent for `message_id` to every connection
    /// of the owning chat: undelivered fragments in append order, then the
    /// terminal frame exactly once per attachment.
    pub async fn publish(&self, message_id: Uuid) {
        let Some(snapshot) = self.store.get(message_id).await else {
            debug!(message_id = %message_id, "publish for unknown message ignored");
            return;
        };

        let mut dead = Vec::new();
        {
            let mut chats = self.registry.chats().write().await;
            let Some(connections) = chats.get_mut(&snapshot.chat_id) else {
                return;
            };

            for (connection_id, entry) in connections.iter_mut() {
                let progress = entry.progress.entry(message_id).or_default();
                let mut failed = false;

                while progress.delivered < snapshot.fragments.len() {
                    let frame = ServerFrame::chunk(
                        message_id,
                        snapshot.fragments[progress.delivered].clone(),
                    );
                    if entry.tx.try_send(frame).is_err() {
                        failed = true;
                        break;
                    }
                    progress.delivered += 1;
                    self.metrics.frame_sent();
                }

                if !failed && !progress.terminal_sent {
                    if let Some(frame) = terminal_frame(&snapshot) {
                        if entry.tx.try_send(frame).is_err() {
                            failed = true;
                        } else {
                            progress.terminal_sent = true;
                            self.metrics.frame_sent();
                        }
                    }
                }

                if failed {
                    // Everything this attachment will now never receive:
                    // the undelivered fragments plus a pending terminal.
                    let mut dropped = snapshot.fragments.len() - progress.delivered;
                    if !progress.terminal_sent && terminal_frame(&snapshot).is_some() {
                        dropped += 1;
                    }
                    self.metrics.frames_dropped(dropped as u64);
                    dead.push(*connection_id);
                }
            }
        }

        // Dead connections are removed outside the fan-out lock; their
        // handler loops notice the dropped sender and wind down.
        for connection_id in dead {
            warn!(
                chat_id = %snapshot.chat_id,
                connection_id = %connection_id,
                "outbound channel full or closed, dropping connection"
            );
            self.registry
                .unregister(snapshot.chat_id, connection_id)
                .await;
        }
    }

    /// Synchronously replay a message's accumulated content to one
    /// connection: a `stream_content` frame with the full concatenation,
    /// then the terminal frame if the message already finished.
    ///
    /// Runs under the same lock as `publish`, so the replay cannot
    /// interleave with live chunk delivery; the connection's offset is
    /// fast-forwarded past the replayed fragments and live delivery
    /// continues from there with no duplicates.
    pub async fn replay(
        &self,
        chat_id: Uuid,
        connection_id: Uuid,
        message_id: Uuid,
    ) -> Result<(), RelayError> {
        let mut failed = false;
        {
            let mut chats = self.registry.chats().write().await;
            let Some(entry) = chats
                .get_mut(&chat_id)
                .and_then(|c| c.get_mut(&connection_id))
            else {
                // Connection already torn down; nothing to replay into.
                return Ok(());
            };

            // Messages from other chats are indistinguishable from unknown
            // ids: a connection only ever sees its own chat's streams.
            let snapshot = self
                .store
                .get(message_id)
                .await
                .filter(|s| s.chat_id == chat_id)
                .ok_or(RelayError::UnknownMessage(message_id))?;

            self.metrics.stream_request();
            let progress = entry.progress.entry(message_id).or_default();

            let frame = ServerFrame::stream_content(message_id, snapshot.full_content());
            if entry.tx.try_send(frame).is_err() {
                failed = true;
            } else {
                progress.delivered = progress.delivered.max(snapshot.fragments.len());
                self.metrics.frame_sent();
            }

            if !failed && !progress.terminal_sent {
                if let Some(frame) = terminal_frame(&snapshot) {
                    if entry.tx.try_send(frame).is_err() {
                        failed = true;
                    } else {
                        progress.terminal_sent = true;
                        self.metrics.frame_sent();
                    }
                }
            }
        }

        if failed {
            self.metrics.frames_dropped(1);
            warn!(
                chat_id = %chat_id,
                connection_id = %connection_id,
                "outbound channel full or closed during replay, dropping connection"
            );
            self.registry.unregister(chat_id, connection_id).await;
            return Err(RelayError::DeliveryFailure(connection_id));
        }
        Ok(())
    }
}
