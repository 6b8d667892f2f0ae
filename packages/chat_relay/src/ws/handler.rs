//! WebSocket Handler
//!
//! Per-connection protocol loop. The socket is split into an input half
//! (client frames) and a sender half fed by an mpsc channel; the dispatcher
//! pushes fragments into the same channel, so everything the client sees
//! flows through one ordered writer.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::RelayError;

use super::protocol::{ClientFrame, ServerFrame};

/// Handle one chat WebSocket connection from registration to teardown.
///
/// The token was already validated by the upgrade handler; this function
/// starts at the registered/active state and guarantees unregistration on
/// every exit path, including decode errors and socket failures.
pub async fn handle_chat_ws(socket: WebSocket, chat_id: Uuid, state: AppState) {
    let connection_id = Uuid::new_v4();
    state.metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending frames to the WebSocket
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(state.server_config.send_channel_capacity);

    // Baseline the subscription at the chat's current fragment counts so
    // this attachment only receives fragments published from now on;
    // history is fetched explicitly via stream_request.
    let baseline = state.store.fragment_counts_for_chat(chat_id).await;
    let epoch = state
        .registry
        .register(chat_id, connection_id, tx.clone(), baseline)
        .await;
    info!(chat_id = %chat_id, connection_id = %connection_id, epoch, "chat connection opened");

    if tx
        .send(ServerFrame::connection_established(
            chat_id,
            chrono::Utc::now().timestamp(),
        ))
        .await
        .is_err()
    {
        warn!(connection_id = %connection_id, "failed to send connection_established - channel closed");
    }

    // Task to send frames to the WebSocket
    let sender_task = async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    // Task to handle incoming frames
    let tx_input = tx.clone();
    let dispatcher = state.dispatcher.clone();
    let metrics = state.metrics.clone();
    let keepalive = state.server_config.keepalive;

    let input_task = async move {
        loop {
            let msg = match tokio::time::timeout(keepalive, ws_receiver.next()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(_) => {
                    info!(connection_id = %connection_id, "connection idle beyond keepalive window, closing");
                    break;
                }
            };

            match msg {
                Ok(Message::Text(text)) => {
                    metrics.frame_received();
                    match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(ClientFrame::Ping { timestamp }) => {
                            if tx_input.send(ServerFrame::pong(timestamp)).await.is_err() {
                                break;
                            }
                        }
                        Ok(ClientFrame::StreamRequest { message_id }) => {
                            match dispatcher.replay(chat_id, connection_id, message_id).await {
                                Ok(()) => {}
                                Err(RelayError::UnknownMessage(_)) => {
                                    let frame = ServerFrame::error(
                                        RelayError::UnknownMessage(message_id).to_string(),
                                    );
                                    if tx_input.send(frame).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            }
                        }
                        Err(e) => {
                            debug!(connection_id = %connection_id, "undecodable frame: {}", e);
                            let frame = ServerFrame::error(
                                RelayError::MalformedFrame(
                                    "expected ping or stream_request".to_string(),
                                )
                                .to_string(),
                            );
                            if tx_input.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!(connection_id = %connection_id, "client closed connection");
                    break;
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    // Transport-level keepalive; axum answers pings itself.
                }
                Ok(Message::Binary(_)) => {
                    metrics.frame_received();
                    let frame = ServerFrame::error(
                        RelayError::MalformedFrame("binary frames are not supported".to_string())
                            .to_string(),
                    );
                    if tx_input.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(connection_id = %connection_id, "WebSocket error: {}", e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!("sender task ended"),
        _ = input_task => debug!("input task ended"),
    }

    // Scoped cleanup: runs on every exit path, so a connection can never
    // outlive its loop inside the registry.
    state.registry.unregister(chat_id, connection_id).await;
    state.metrics.connection_closed();
    info!(chat_id = %chat_id, connection_id = %connection_id, "chat connection closed");
}
