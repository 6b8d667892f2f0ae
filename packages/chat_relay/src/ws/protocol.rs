//! WebSocket Protocol Types
//!
//! JSON frame types for the persistent chat connection. Typed frames carry
//! a `"type"` tag; the one-shot error frame is a bare `{"error": ...}`
//! object so clients can surface it without dispatching on type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::SourceRef;

/// Frames sent FROM the client TO the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keepalive probe; answered with a pong echoing the timestamp.
    Ping { timestamp: i64 },
    /// Re-synchronize on a message: replay the accumulated content, then
    /// continue the live subscription.
    StreamRequest { message_id: Uuid },
}

/// Typed frames sent FROM the server TO the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First frame after accept, confirming the subscription.
    ConnectionEstablished { chat_id: Uuid, timestamp: i64 },
    Pong {
        timestamp: i64,
    },
    /// Full accumulated content, sent in reply to a stream_request.
    StreamContent {
        message_id: Uuid,
        content: String,
    },
    /// One incremental fragment of a streaming response.
    Chunk {
        message_id: Uuid,
        content: String,
    },
    /// Terminal frame for a successfully completed response.
    Complete {
        message_id: Uuid,
        sources: Vec<SourceRef>,
    },
}

/// Any outbound frame: a typed event or the bare error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Event(ServerEvent),
    Error { error: String },
}

impl ServerFrame {
    pub fn connection_established(chat_id: Uuid, timestamp: i64) -> Self {
        Self::Event(ServerEvent::ConnectionEstablished { chat_id, timestamp })
    }

    pub fn pong(timestamp: i64) -> Self {
        Self::Event(ServerEvent::Pong { timestamp })
    }

    pub fn stream_content(message_id: Uuid, content: String) -> Self {
        Self::Event(ServerEvent::StreamContent {
            message_id,
            content,
        })
    }

    pub fn chunk(message_id: Uuid, content: String) -> Self {
        Self::Event(ServerEvent::Chunk {
            message_id,
            content,
        })
    }

    pub fn complete(message_id: Uuid, sources: Vec<SourceRef>) -> Self {
        Self::Event(ServerEvent::Complete {
            message_id,
            sources,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_round_trip() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"ping","timestamp":1000}"#).unwrap();
        assert_eq!(frame, ClientFrame::Ping { timestamp: 1000 });
    }

    #[test]
    fn stream_request_decodes_message_id() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"stream_request","message_id":"{id}"}}"#);
        let frame: ClientFrame = serde_json::from_str(&raw).unwrap();
        assert_eq!(frame, ClientFrame::StreamRequest { message_id: id });
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"dance"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }

    #[test]
    fn pong_wire_shape() {
        let json = serde_json::to_value(ServerFrame::pong(1000)).unwrap();
        assert_eq!(json, serde_json::json!({"type":"pong","timestamp":1000}));
    }

    #[test]
    fn chunk_wire_shape() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ServerFrame::chunk(id, "Hel".into())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type":"chunk","message_id":id.to_string(),"content":"Hel"})
        );
    }

    #[test]
    fn complete_wire_shape_with_sources() {
        let id = Uuid::new_v4();
        let sources = vec![SourceRef {
            title: "doc".into(),
            url: "https://example.com/doc".into(),
            content: Some("page 3".into()),
        }];
        let json = serde_json::to_value(ServerFrame::complete(id, sources)).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["sources"][0]["title"], "doc");
        assert_eq!(json["sources"][0]["content"], "page 3");
    }

    #[test]
    fn error_frame_has_no_type_tag() {
        let json = serde_json::to_value(ServerFrame::error("bad frame")).unwrap();
        assert_eq!(json, serde_json::json!({"error":"bad frame"}));
    }

    #[test]
    fn server_frame_round_trip() {
        for frame in [
            ServerFrame::pong(7),
            ServerFrame::chunk(Uuid::new_v4(), "x".into()),
            ServerFrame::complete(Uuid::new_v4(), vec![]),
            ServerFrame::error("boom"),
        ] {
            let raw = serde_json::to_string(&frame).unwrap();
            let back: ServerFrame = serde_json::from_str(&raw).unwrap();
            assert_eq!(back, frame);
        }
    }
}
