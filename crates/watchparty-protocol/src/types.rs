//! Core data types shared by the server, the client, and the wire format.
//!
//! Identities are opaque strings handed to us by the authentication layer;
//! the only thing this crate does with them is compare them. Room codes are
//! the one identifier we mint ourselves, so they get real validation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

/// Sender id used for chat lines synthesized by the server.
pub const SYSTEM_SENDER_ID: &str = "system";

/// Display name used for chat lines synthesized by the server.
pub const SYSTEM_SENDER_NAME: &str = "System";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A user's identity, as supplied by the authentication layer.
///
/// Newtype so a user id can't be passed where a room code is expected.
/// `#[serde(transparent)]` keeps it a plain JSON string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a user id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id reserved for server-authored chat lines.
    pub fn system() -> Self {
        Self(SYSTEM_SENDER_ID.to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The short, human-typable code that addresses a room.
///
/// Always six ASCII uppercase letters or digits. Parsing is
/// case-insensitive: `"ab12cd"` and `"AB12CD"` are the same room. Because
/// deserialization goes through [`RoomCode::parse`], a malformed code in a
/// client message is rejected at decode time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Number of characters in a room code.
    pub const LEN: usize = 6;

    /// The characters a generated code is drawn from.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Validates and normalizes (upper-cases) a room code.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidRoomCode`] unless the trimmed input
    /// is exactly six ASCII letters or digits.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let trimmed = input.trim();
        if trimmed.len() != Self::LEN
            || !trimmed.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(ProtocolError::InvalidRoomCode(input.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Returns the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// Room content
// ---------------------------------------------------------------------------

/// The video a room is watching. Opaque to the server: it is handed over
/// by the catalog/player UI and echoed back to every participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRef {
    pub video_url: String,
    pub title: String,
}

impl VideoRef {
    pub fn new(video_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            video_url: video_url.into(),
            title: title.into(),
        }
    }
}

/// A participant as seen on the wire.
///
/// `is_host` and `connected` are derived by the room at the moment the
/// roster is serialized; they are never stored alongside the participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub user_id: UserId,
    pub username: String,
    pub is_host: bool,
    /// `false` while the participant is inside its reconnection grace window.
    pub connected: bool,
    pub joined_at: DateTime<Utc>,
}

/// One line of the room's chat timeline.
///
/// `seq` is assigned by the room when the line is appended and is the only
/// ordering key: every participant sees the same lines in the same `seq`
/// order. `sent_at` is wall-clock and purely informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: UserId,
    pub sender_name: String,
    pub text: String,
    pub seq: u64,
    pub sent_at: DateTime<Utc>,
    pub is_system: bool,
}

/// Stable, machine-readable error codes carried by `error` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RoomNotFound,
    RoomFull,
    InvalidHostAction,
    NotInRoom,
    InvalidMessage,
    AlreadyInRoom,
    RoomCreationFailed,
}

impl ErrorCode {
    /// The wire spelling, e.g. `"ROOM_NOT_FOUND"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::RoomFull => "ROOM_FULL",
            Self::InvalidHostAction => "INVALID_HOST_ACTION",
            Self::NotInRoom => "NOT_IN_ROOM",
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::AlreadyInRoom => "ALREADY_IN_ROOM",
            Self::RoomCreationFailed => "ROOM_CREATION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_parse_uppercases_input() {
        let code = RoomCode::parse("ab12cd").unwrap();
        assert_eq!(code.as_str(), "AB12CD");
        assert_eq!(code, RoomCode::parse("AB12CD").unwrap());
    }

    #[test]
    fn test_room_code_parse_trims_whitespace() {
        assert_eq!(RoomCode::parse("  XYZ789 ").unwrap().as_str(), "XYZ789");
    }

    #[test]
    fn test_room_code_parse_rejects_wrong_length() {
        assert!(matches!(
            RoomCode::parse("ABC12"),
            Err(ProtocolError::InvalidRoomCode(_))
        ));
        assert!(RoomCode::parse("ABC1234").is_err());
        assert!(RoomCode::parse("").is_err());
    }

    #[test]
    fn test_room_code_parse_rejects_symbols_and_non_ascii() {
        assert!(RoomCode::parse("AB-12C").is_err());
        assert!(RoomCode::parse("ÄB12CD").is_err());
    }

    #[test]
    fn test_room_code_deserialize_validates() {
        let code: RoomCode = serde_json::from_str(r#""qwe123""#).unwrap();
        assert_eq!(code.as_str(), "QWE123");

        let bad: Result<RoomCode, _> = serde_json::from_str(r#""nope""#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_room_code_serializes_as_plain_string() {
        let code = RoomCode::parse("ROOM01").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), r#""ROOM01""#);
    }

    #[test]
    fn test_user_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserId::new("u1")).unwrap();
        assert_eq!(json, r#""u1""#);
    }

    #[test]
    fn test_chat_message_uses_camel_case_fields() {
        let msg = ChatMessage {
            id: Uuid::nil(),
            sender_id: UserId::system(),
            sender_name: SYSTEM_SENDER_NAME.into(),
            text: "alice joined the watch party".into(),
            seq: 3,
            sent_at: Utc::now(),
            is_system: true,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderId"], "system");
        assert_eq!(json["isSystem"], true);
        assert_eq!(json["seq"], 3);
        assert!(json["sentAt"].is_string());
    }

    #[test]
    fn test_error_code_wire_spelling_matches_as_str() {
        for code in [
            ErrorCode::RoomNotFound,
            ErrorCode::RoomFull,
            ErrorCode::InvalidHostAction,
            ErrorCode::NotInRoom,
            ErrorCode::InvalidMessage,
            ErrorCode::AlreadyInRoom,
            ErrorCode::RoomCreationFailed,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, code.as_str());
        }
    }
}
