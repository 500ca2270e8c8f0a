//! Unified error type for the watch-party server.

use watchparty_protocol::ProtocolError;
use watchparty_room::RoomError;
use watchparty_session::SessionError;
use watchparty_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WatchPartyError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A presence-tracking error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, not found, not host).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Binding or serving the HTTP listener failed.
    #[error("http server error: {0}")]
    Http(#[from] std::io::Error),
}
