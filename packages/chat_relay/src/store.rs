//! Stream Buffer Store
//!
//! Per-message accumulator for AI response fragments. Fragments arrive
//! out-of-band from the callback endpoint and are appended in order;
//! connected clients are fanned out to by the dispatcher, while late or
//! reconnecting clients fetch the accumulated content via `stream_request`.
//!
//! Terminal messages are retained for a bounded window so a reconnecting
//! client can still fetch the full content, then purged by the sweeper.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RelayError;

/// A source reference attached to a completed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Lifecycle state of one in-flight AI response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Pending,
    Streaming,
    Complete,
    Errored,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Complete | StreamState::Errored)
    }
}

struct StreamEntry {
    chat_id: Uuid,
    fragments: Vec<String>,
    state: StreamState,
    sources: Vec<SourceRef>,
    error: Option<String>,
    created_at: Instant,
    terminal_at: Option<Instant>,
}

/// Point-in-time copy of a message handed to readers. Mutations behind the
/// store lock can never be observed half-applied through a snapshot.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    pub message_id: Uuid,
    pub chat_id: Uuid,
    pub fragments: Vec<String>,
    pub state: StreamState,
    pub sources: Vec<SourceRef>,
    pub error: Option<String>,
}

impl MessageSnapshot {
    /// All fragments concatenated in append order.
    pub fn full_content(&self) -> String {
        self.fragments.concat()
    }
}

/// Shared accumulator keyed by message id.
#[derive(Default)]
pub struct StreamStore {
    entries: RwLock<HashMap<Uuid, StreamEntry>>,
}

impl StreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-flight message. Duplicate ids are a caller bug.
    pub async fn create(&self, message_id: Uuid, chat_id: Uuid) -> Result<(), RelayError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&message_id) {
            return Err(RelayError::AlreadyExists(message_id));
        }
        entries.insert(
            message_id,
            StreamEntry {
                chat_id,
                fragments: Vec::new(),
                state: StreamState::Pending,
                sources: Vec::new(),
                error: None,
                created_at: Instant::now(),
                terminal_at: None,
            },
        );
        debug!(message_id = %message_id, chat_id = %chat_id, "stream message created");
        Ok(())
    }

    /// Append one fragment. Rejected (without mutating) when the message is
    /// unknown or already terminal.
    pub async fn append_fragment(
        &self,
        message_id: Uuid,
        content: String,
    ) -> Result<(), RelayError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&message_id)
            .ok_or(RelayError::UnknownMessage(message_id))?;
        if entry.state.is_terminal() {
            return Err(RelayError::AlreadyTerminal(message_id));
        }
        entry.fragments.push(content);
        entry.state = StreamState::Streaming;
        Ok(())
    }

    /// Transition to `complete` with the given sources. Terminal exactly once.
    pub async fn complete(
        &self,
        message_id: Uuid,
        sources: Vec<SourceRef>,
    ) -> Result<(), RelayError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&message_id)
            .ok_or(RelayError::UnknownMessage(message_id))?;
        if entry.state.is_terminal() {
            return Err(RelayError::AlreadyTerminal(message_id));
        }
        entry.state = StreamState::Complete;
        entry.sources = sources;
        entry.terminal_at = Some(Instant::now());
        debug!(message_id = %message_id, fragments = entry.fragments.len(), "stream message complete");
        Ok(())
    }

    /// Transition to `errored` with a reason. Terminal exactly once.
    pub async fn fail(&self, message_id: Uuid, reason: String) -> Result<(), RelayError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&message_id)
            .ok_or(RelayError::UnknownMessage(message_id))?;
        if entry.state.is_terminal() {
            return Err(RelayError::AlreadyTerminal(message_id));
        }
        entry.state = StreamState::Errored;
        entry.error = Some(reason);
        entry.terminal_at = Some(Instant::now());
        Ok(())
    }

    /// Snapshot a message, or `None` if the store has never seen it (or it
    /// has been purged).
    pub async fn get(&self, message_id: Uuid) -> Option<MessageSnapshot> {
        let entries = self.entries.read().await;
        entries.get(&message_id).map(|e| MessageSnapshot {
            message_id,
            chat_id: e.chat_id,
            fragments: e.fragments.clone(),
            state: e.state,
            sources: e.sources.clone(),
            error: e.error.clone(),
        })
    }

    /// Current fragment counts for every message belonging to `chat_id`.
    /// The registry uses this as the delivery baseline for a fresh
    /// subscription: fragments appended before attach are only visible via
    /// `stream_request` replay.
    pub async fn fragment_counts_for_chat(&self, chat_id: Uuid) -> Vec<(Uuid, usize)> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, e)| e.chat_id == chat_id)
            .map(|(id, e)| (*id, e.fragments.len()))
            .collect()
    }

    /// Purge terminal messages older than `retention` and mark messages
    /// stuck non-terminal for longer than `pending_timeout` as errored.
    ///
    /// Returns the ids newly errored so the caller can publish the terminal
    /// frame to attached connections.
    pub async fn sweep(&self, retention: Duration, pending_timeout: Duration) -> Vec<Uuid> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let before = entries.len();
        entries.retain(|_, e| match e.terminal_at {
            Some(t) => now.duration_since(t) < retention,
            None => true,
        });
        let purged = before - entries.len();

        let mut timed_out = Vec::new();
        for (id, entry) in entries.iter_mut() {
            if !entry.state.is_terminal() && now.duration_since(entry.created_at) > pending_timeout
            {
                entry.state = StreamState::Errored;
                entry.error = Some("response timed out".to_string());
                entry.terminal_at = Some(now);
                timed_out.push(*id);
            }
        }

        if purged > 0 || !timed_out.is_empty() {
            warn!(purged, timed_out = timed_out.len(), "stream store sweep");
        }
        timed_out
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fragments_kept_in_append_order() {
        let store = StreamStore::new();
        let (m, c) = (Uuid::new_v4(), Uuid::new_v4());
        store.create(m, c).await.unwrap();

        for part in ["one ", "two ", "three"] {
            store.append_fragment(m, part.to_string()).await.unwrap();
        }

        let snap = store.get(m).await.unwrap();
        assert_eq!(snap.fragments, vec!["one ", "two ", "three"]);
        assert_eq!(snap.full_content(), "one two three");
        assert_eq!(snap.state, StreamState::Streaming);
    }

    #[tokio::test]
    async fn create_is_pending_until_first_fragment() {
        let store = StreamStore::new();
        let (m, c) = (Uuid::new_v4(), Uuid::new_v4());
        store.create(m, c).await.unwrap();
        assert_eq!(store.get(m).await.unwrap().state, StreamState::Pending);
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = StreamStore::new();
        let (m, c) = (Uuid::new_v4(), Uuid::new_v4());
        store.create(m, c).await.unwrap();
        assert!(matches!(
            store.create(m, c).await,
            Err(RelayError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn terminal_is_exactly_once_and_rejects_fragments() {
        let store = StreamStore::new();
        let (m, c) = (Uuid::new_v4(), Uuid::new_v4());
        store.create(m, c).await.unwrap();
        store.append_fragment(m, "hi".into()).await.unwrap();
        store.complete(m, vec![]).await.unwrap();

        assert!(matches!(
            store.append_fragment(m, "late".into()).await,
            Err(RelayError::AlreadyTerminal(_))
        ));
        assert!(matches!(
            store.complete(m, vec![]).await,
            Err(RelayError::AlreadyTerminal(_))
        ));
        assert!(matches!(
            store.fail(m, "nope".into()).await,
            Err(RelayError::AlreadyTerminal(_))
        ));

        // The late callback did not mutate anything
        let snap = store.get(m).await.unwrap();
        assert_eq!(snap.fragments, vec!["hi"]);
        assert_eq!(snap.state, StreamState::Complete);
    }

    #[tokio::test]
    async fn unknown_message_rejected() {
        let store = StreamStore::new();
        let m = Uuid::new_v4();
        assert!(matches!(
            store.append_fragment(m, "x".into()).await,
            Err(RelayError::UnknownMessage(_))
        ));
        assert!(store.get(m).await.is_none());
    }

    #[tokio::test]
    async fn fail_records_reason() {
        let store = StreamStore::new();
        let (m, c) = (Uuid::new_v4(), Uuid::new_v4());
        store.create(m, c).await.unwrap();
        store.fail(m, "upstream down".into()).await.unwrap();

        let snap = store.get(m).await.unwrap();
        assert_eq!(snap.state, StreamState::Errored);
        assert_eq!(snap.error.as_deref(), Some("upstream down"));
    }

    #[tokio::test]
    async fn fragment_counts_scoped_to_chat() {
        let store = StreamStore::new();
        let chat_a = Uuid::new_v4();
        let chat_b = Uuid::new_v4();
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        store.create(m1, chat_a).await.unwrap();
        store.create(m2, chat_b).await.unwrap();
        store.append_fragment(m1, "a".into()).await.unwrap();
        store.append_fragment(m1, "b".into()).await.unwrap();

        let counts = store.fragment_counts_for_chat(chat_a).await;
        assert_eq!(counts, vec![(m1, 2)]);
    }

    #[tokio::test]
    async fn sweep_purges_terminal_and_times_out_stuck() {
        let store = StreamStore::new();
        let chat = Uuid::new_v4();
        let done = Uuid::new_v4();
        let stuck = Uuid::new_v4();
        store.create(done, chat).await.unwrap();
        store.create(stuck, chat).await.unwrap();
        store.complete(done, vec![]).await.unwrap();

        // Zero windows: terminal entries purge immediately, non-terminal
        // entries time out immediately.
        let timed_out = store.sweep(Duration::ZERO, Duration::ZERO).await;
        assert_eq!(timed_out, vec![stuck]);
        assert!(store.get(done).await.is_none());
        assert_eq!(store.get(stuck).await.unwrap().state, StreamState::Errored);
    }

    #[tokio::test]
    async fn sweep_keeps_recent_entries() {
        let store = StreamStore::new();
        let chat = Uuid::new_v4();
        let m = Uuid::new_v4();
        store.create(m, chat).await.unwrap();
        store.complete(m, vec![]).await.unwrap();

        let timed_out = store
            .sweep(Duration::from_secs(3600), Duration::from_secs(600))
            .await;
        assert!(timed_out.is_empty());
        assert!(store.get(m).await.is_some());
    }
}
