//! Server metrics for observability
//!
//! Runtime counters for monitoring relay health, served as a JSON snapshot
//! from `/metrics`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently active WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,

    // Frame metrics
    /// Frames received from clients
    pub frames_received: AtomicU64,
    /// Frames sent to clients
    pub frames_sent: AtomicU64,
    /// Frames dropped because a client's outbound channel was full or closed
    pub frames_dropped: AtomicU64,

    // Stream metrics
    /// Messages submitted to the AI service
    pub messages_created: AtomicU64,
    /// Messages that reached the complete state
    pub messages_completed: AtomicU64,
    /// Messages that reached the errored state
    pub messages_failed: AtomicU64,
    /// Callbacks accepted from the AI service
    pub callbacks_received: AtomicU64,
    /// Callbacks ignored as unknown/already-terminal no-ops
    pub callbacks_ignored: AtomicU64,
    /// stream_request replays served
    pub stream_requests: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_dropped(&self, count: u64) {
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn message_created(&self) {
        self.messages_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_completed(&self) {
        self.messages_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_failed(&self) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn callback_received(&self) {
        self.callbacks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn callback_ignored(&self) {
        self.callbacks_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_request(&self) {
        self.stream_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            frames: FrameMetrics {
                received: self.frames_received.load(Ordering::Relaxed),
                sent: self.frames_sent.load(Ordering::Relaxed),
                dropped: self.frames_dropped.load(Ordering::Relaxed),
            },
            streams: StreamMetrics {
                created: self.messages_created.load(Ordering::Relaxed),
                completed: self.messages_completed.load(Ordering::Relaxed),
                failed: self.messages_failed.load(Ordering::Relaxed),
                callbacks_received: self.callbacks_received.load(Ordering::Relaxed),
                callbacks_ignored: self.callbacks_ignored.load(Ordering::Relaxed),
                stream_requests: self.stream_requests.load(Ordering::Relaxed),
            },
        }
    }
}

/// Point-in-time view of all metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub frames: FrameMetrics,
    pub streams: StreamMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetrics {
    pub created: u64,
    pub completed: u64,
    pub failed: u64,
    pub callbacks_received: u64,
    pub callbacks_ignored: u64,
    pub stream_requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_reflected_in_snapshot() {
        let m = ServerMetrics::new();
        m.connection_opened();
        m.connection_opened();
        m.connection_closed();
        m.frame_received();
        m.frame_sent();
        m.frames_dropped(3);
        m.message_created();
        m.callback_received();
        m.callback_ignored();
        m.stream_request();

        let snap = m.snapshot();
        assert_eq!(snap.connections.active, 1);
        assert_eq!(snap.connections.total, 2);
        assert_eq!(snap.frames.received, 1);
        assert_eq!(snap.frames.sent, 1);
        assert_eq!(snap.frames.dropped, 3);
        assert_eq!(snap.streams.created, 1);
        assert_eq!(snap.streams.callbacks_received, 1);
        assert_eq!(snap.streams.callbacks_ignored, 1);
        assert_eq!(snap.streams.stream_requests, 1);
    }

    #[test]
    fn snapshot_serializes() {
        let m = ServerMetrics::new();
        let json = serde_json::to_value(m.snapshot()).unwrap();
        assert!(json["connections"]["active"].is_u64());
        assert!(json["streams"]["callbacks_ignored"].is_u64());
    }
}
