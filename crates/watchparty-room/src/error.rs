//! Error types for the room layer.

use watchparty_protocol::{ErrorCode, RoomCode, UserId};

/// Errors that can occur during room operations.
///
/// Every variant maps onto a stable wire [`ErrorCode`] through
/// [`RoomError::code`], so the router can forward it to the offending
/// client unchanged.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist, or it closed while the request was queued.
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    /// The room is at capacity and the joiner is not already a member.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// A non-host tried to control playback.
    #[error("only the host can control playback ({0} is not the host)")]
    InvalidHostAction(UserId),

    /// The user is not a current participant, or is speaking through a
    /// connection that has since been replaced.
    #[error("user {0} is not in room {1}")]
    NotInRoom(UserId, RoomCode),

    /// The request was well-formed JSON but its content is unacceptable.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The connection is already bound to a different room.
    #[error("connection is already in room {0}")]
    AlreadyInRoom(RoomCode),

    /// No unused room code was found within the attempt budget.
    #[error("could not allocate a room code after {attempts} attempts")]
    RoomCreationFailed { attempts: usize },
}

impl RoomError {
    /// The wire error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RoomNotFound(_) => ErrorCode::RoomNotFound,
            Self::RoomFull(_) => ErrorCode::RoomFull,
            Self::InvalidHostAction(_) => ErrorCode::InvalidHostAction,
            Self::NotInRoom(..) => ErrorCode::NotInRoom,
            Self::InvalidMessage(_) => ErrorCode::InvalidMessage,
            Self::AlreadyInRoom(_) => ErrorCode::AlreadyInRoom,
            Self::RoomCreationFailed { .. } => ErrorCode::RoomCreationFailed,
        }
    }
}
