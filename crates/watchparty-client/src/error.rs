use watchparty_protocol::{ErrorCode, ProtocolError};
use watchparty_transport::TransportError;

/// Errors surfaced by [`crate::WatchPartyClient`] and [`crate::PartyHandle`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server refused the join.
    #[error("join rejected ({code}): {message}")]
    JoinRejected { code: ErrorCode, message: String },

    /// The server closed the channel before answering the join.
    #[error("server closed the connection during join")]
    JoinInterrupted,

    /// Reconnection gave up, or the driver has otherwise stopped.
    #[error("connection lost")]
    ConnectionLost,

    /// This client was configured without reactions.
    #[error("reactions are disabled for this client")]
    ReactionsDisabled,
}
