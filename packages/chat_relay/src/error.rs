//! Error taxonomy for the relay.
//!
//! Errors local to one connection never affect the stream store or other
//! connections; collaborator failures are surfaced to clients as error
//! frames or errored messages, never as raw upstream errors.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Bad or expired token at handshake. The connection is refused with
    /// 401 before the protocol state machine starts.
    #[error("invalid or expired token")]
    Unauthorized,

    /// A stream_request or callback referenced a message id the store has
    /// never seen.
    #[error("unknown message {0}")]
    UnknownMessage(Uuid),

    /// A mutation arrived after the message reached complete/errored.
    /// Callers treat this as an idempotent no-op.
    #[error("message {0} is already terminal")]
    AlreadyTerminal(Uuid),

    /// An inbound frame failed to decode. Answered with an error frame;
    /// the connection stays open.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A send to one connection's outbound channel failed. The connection
    /// is torn down; buffered message state is untouched.
    #[error("delivery to connection {0} failed")]
    DeliveryFailure(Uuid),

    /// Duplicate `create` for a message id. Indicates a caller bug, not a
    /// runtime condition.
    #[error("message {0} already exists")]
    AlreadyExists(Uuid),
}
