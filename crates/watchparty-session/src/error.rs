//! Error types for the session layer.

use watchparty_protocol::UserId;
use watchparty_transport::ConnectionId;

/// Errors that can occur while tracking participant presence.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Nothing is tracked for this user.
    #[error("no presence tracked for user {0}")]
    NotFound(UserId),

    /// The connection that closed is not the user's live connection: it was
    /// already replaced by a newer one, or the user is already disconnected.
    #[error("connection {connection_id} is not the live connection of user {user_id}")]
    StaleConnection {
        user_id: UserId,
        connection_id: ConnectionId,
    },
}
