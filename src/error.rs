//! Unified error hierarchy for collabd.
//!
//! Split by layer the way the teacher splits `HandlerError` / `ChannelError`:
//! [`RoomError`] covers room-engine-level failures, [`EnvelopeError`] covers
//! transport/session-level failures. Neither variant is meant to tear a room
//! down — per spec §7 the core never fails a room due to a single
//! connection's misbehavior, so callers log these and move on rather than
//! propagate them as `?`.

use thiserror::Error;

/// Errors surfaced by a room engine's public operations.
#[derive(Debug, Clone, Error)]
pub enum RoomError {
    #[error("connection {0} is not attached to this room")]
    UnknownConnection(String),

    #[error("room already seeded, storage:init ignored")]
    AlreadySeeded,

    #[error(transparent)]
    Crdt(#[from] collab_crdt::Error),
}

impl RoomError {
    /// Static label for metrics (mirrors the teacher's `error_code()`).
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownConnection(_) => "unknown_connection",
            Self::AlreadySeeded => "already_seeded",
            Self::Crdt(_) => "crdt",
        }
    }
}

/// Errors surfaced by the session/transport layer.
#[derive(Debug, Clone, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unknown room: {0}")]
    UnknownRoom(String),

    #[error("peer send queue full, dropping connection")]
    TransportBackpressure,
}

impl EnvelopeError {
    /// Static label for metrics (mirrors the teacher's `error_code()`).
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope(_) => "malformed_envelope",
            Self::UnknownRoom(_) => "unknown_room",
            Self::TransportBackpressure => "transport_backpressure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_error_codes() {
        assert_eq!(
            EnvelopeError::UnknownRoom("x".into()).error_code(),
            "unknown_room"
        );
        assert_eq!(
            EnvelopeError::TransportBackpressure.error_code(),
            "transport_backpressure"
        );
    }

    #[test]
    fn room_error_codes() {
        assert_eq!(
            RoomError::UnknownConnection("c1".into()).error_code(),
            "unknown_connection"
        );
        assert_eq!(RoomError::AlreadySeeded.error_code(), "already_seeded");
    }
}
