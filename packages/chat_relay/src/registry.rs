//! Connection Registry
//!
//! Tracks live client connections keyed by chat id. A chat may have any
//! number of concurrent connections; each connection belongs to exactly one
//! chat for its lifetime. Registration assigns a strictly increasing
//! subscription epoch so the dispatcher can suppress duplicate delivery
//! across a disconnect/reconnect race.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::ws::protocol::ServerFrame;

/// Delivery position of one (connection, message) pair, owned by the
/// dispatcher. `delivered` is the number of fragments already sent to this
/// attachment; `terminal_sent` latches the complete/error frame.
#[derive(Debug, Default, Clone)]
pub(crate) struct MessageProgress {
    pub delivered: usize,
    pub terminal_sent: bool,
}

pub(crate) struct ConnectionEntry {
    pub epoch: u64,
    pub tx: mpsc::Sender<ServerFrame>,
    pub progress: HashMap<Uuid, MessageProgress>,
}

type ChatMap = HashMap<Uuid, HashMap<Uuid, ConnectionEntry>>;

#[derive(Default)]
pub struct ConnectionRegistry {
    chats: RwLock<ChatMap>,
    next_epoch: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a chat and return its subscription epoch.
    ///
    /// Idempotent per connection id: re-registering replaces the previous
    /// attachment with a fresh (higher) epoch and resets delivery progress
    /// to `baseline` — the fragment counts current at attach time, so a
    /// late subscriber only receives fragments published after it attached.
    pub async fn register(
        &self,
        chat_id: Uuid,
        connection_id: Uuid,
        tx: mpsc::Sender<ServerFrame>,
        baseline: Vec<(Uuid, usize)>,
    ) -> u64 {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let progress = baseline
            .into_iter()
            .map(|(message_id, delivered)| {
                (
                    message_id,
                    MessageProgress {
                        delivered,
                        terminal_sent: false,
                    },
                )
            })
            .collect();

        let mut chats = self.chats.write().await;
        chats
            .entry(chat_id)
            .or_default()
            .insert(connection_id, ConnectionEntry { epoch, tx, progress });
        debug!(chat_id = %chat_id, connection_id = %connection_id, epoch, "connection registered");
        epoch
    }

    /// Remove a connection. Idempotent; safe to call from both the handler's
    /// scoped cleanup and the dispatcher's dead-connection sweep.
    pub async fn unregister(&self, chat_id: Uuid, connection_id: Uuid) -> bool {
        let mut chats = self.chats.write().await;
        let Some(connections) = chats.get_mut(&chat_id) else {
            return false;
        };
        let removed = connections.remove(&connection_id).is_some();
        if connections.is_empty() {
            chats.remove(&chat_id);
        }
        if removed {
            debug!(chat_id = %chat_id, connection_id = %connection_id, "connection unregistered");
        }
        removed
    }

    /// Connection ids currently attached to a chat.
    pub async fn list_connections(&self, chat_id: Uuid) -> Vec<Uuid> {
        let chats = self.chats.read().await;
        chats
            .get(&chat_id)
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self, chat_id: Uuid) -> usize {
        let chats = self.chats.read().await;
        chats.get(&chat_id).map(|c| c.len()).unwrap_or(0)
    }

    /// Write access to a chat's connection map, for the dispatcher's
    /// fan-out and replay passes.
    pub(crate) fn chats(&self) -> &RwLock<ChatMap> {
        &self.chats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::Sender<ServerFrame> {
        mpsc::channel(8).0
    }

    #[tokio::test]
    async fn epochs_strictly_increase() {
        let registry = ConnectionRegistry::new();
        let chat = Uuid::new_v4();
        let e1 = registry.register(chat, Uuid::new_v4(), sender(), vec![]).await;
        let e2 = registry.register(chat, Uuid::new_v4(), sender(), vec![]).await;
        assert!(e2 > e1);
    }

    #[tokio::test]
    async fn reregister_replaces_with_higher_epoch() {
        let registry = ConnectionRegistry::new();
        let chat = Uuid::new_v4();
        let conn = Uuid::new_v4();
        let e1 = registry.register(chat, conn, sender(), vec![]).await;
        let e2 = registry.register(chat, conn, sender(), vec![]).await;
        assert!(e2 > e1);
        assert_eq!(registry.connection_count(chat).await, 1);
    }

    #[tokio::test]
    async fn multiple_connections_per_chat() {
        let registry = ConnectionRegistry::new();
        let chat = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.register(chat, a, sender(), vec![]).await;
        registry.register(chat, b, sender(), vec![]).await;

        let mut listed = registry.list_connections(chat).await;
        listed.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let chat = Uuid::new_v4();
        let conn = Uuid::new_v4();
        registry.register(chat, conn, sender(), vec![]).await;
        assert!(registry.unregister(chat, conn).await);
        assert!(!registry.unregister(chat, conn).await);
        assert_eq!(registry.connection_count(chat).await, 0);
    }

    #[tokio::test]
    async fn baseline_seeds_delivery_progress() {
        let registry = ConnectionRegistry::new();
        let chat = Uuid::new_v4();
        let conn = Uuid::new_v4();
        let msg = Uuid::new_v4();
        registry.register(chat, conn, sender(), vec![(msg, 2)]).await;

        let chats = registry.chats().read().await;
        let entry = &chats[&chat][&conn];
        assert_eq!(entry.progress[&msg].delivered, 2);
        assert!(!entry.progress[&msg].terminal_sent);
    }
}
