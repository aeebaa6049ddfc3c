//! Error types
//!
//! Registry lookups never fail: unknown series and items resolve to empty
//! results. The errors here cover the session lifecycle, admission and the
//! transport edge.

use crate::session::{ConnectionId, SessionPhase};

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authentication collaborator rejected the connection
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    /// No session with this id (never opened, or already reaped)
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// Lifecycle operation not valid from the current phase
    #[error("connection {id}: cannot {action} while {phase:?}")]
    InvalidTransition {
        id: ConnectionId,
        phase: SessionPhase,
        action: &'static str,
    },

    /// Socket level failure
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Malformed control message from a client
    #[error("invalid control message: {0}")]
    Protocol(#[from] serde_json::Error),

    /// Handshake did not complete in time
    #[error("handshake timed out")]
    HandshakeTimeout,
}

/// Rejection reasons reported by an [`Authenticator`](crate::session::Authenticator)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented
    #[error("missing credentials")]
    MissingCredentials,

    /// Credential was presented but does not resolve to an identity
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Identity exists but may not watch the requested series
    #[error("not authorized for series {0}")]
    SeriesDenied(String),
}

/// Failure to hand an update to a connection's transport
///
/// The dispatcher treats every variant the same way: the connection is
/// scheduled for teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Writer side has gone away
    #[error("connection closed")]
    Closed,

    /// Outbound queue is full (slow consumer)
    #[error("outbound queue full")]
    Full,
}
