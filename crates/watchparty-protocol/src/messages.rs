//! Messages exchanged over the persistent watch-party channel.
//!
//! Every frame is a JSON object tagged by `"type"` in kebab-case, with the
//! payload fields flattened beside the tag in camelCase:
//!
//! ```text
//! {"type":"video-play","currentTime":42.0}
//! {"type":"video-play-sync","currentTime":42.0,"triggeredBy":"u1"}
//! ```

use serde::{Deserialize, Serialize};

use crate::{ChatMessage, ErrorCode, ParticipantInfo, RoomCode, UserId, VideoRef};

// =============================================================================
// Client -> Server
// =============================================================================

/// Messages a viewer sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join (or re-join after a reconnect) a room. The only message
    /// accepted before the connection is bound to a room.
    JoinWatchParty {
        room_id: RoomCode,
        user_id: UserId,
        username: String,
    },

    /// Host only: start playback at `current_time` seconds.
    VideoPlay { current_time: f64 },

    /// Host only: pause playback at `current_time` seconds.
    VideoPause { current_time: f64 },

    /// Host only: jump to `current_time` seconds.
    VideoSeek { current_time: f64 },

    /// Host only: replace the video the room is watching.
    ChangeVideo { video_url: String, title: String },

    /// Post a chat line.
    SendMessage { message: String },

    /// Broadcast an ephemeral emoji reaction.
    SendReaction { emoji: String },

    /// Keep-alive. Answered with `heartbeat-ack`.
    Heartbeat { client_time: u64 },

    /// Leave the room for good. The connection stays open.
    LeaveWatchParty,
}

impl ClientMessage {
    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinWatchParty { .. } => "join-watch-party",
            Self::VideoPlay { .. } => "video-play",
            Self::VideoPause { .. } => "video-pause",
            Self::VideoSeek { .. } => "video-seek",
            Self::ChangeVideo { .. } => "change-video",
            Self::SendMessage { .. } => "send-message",
            Self::SendReaction { .. } => "send-reaction",
            Self::Heartbeat { .. } => "heartbeat",
            Self::LeaveWatchParty => "leave-watch-party",
        }
    }
}

// =============================================================================
// Server -> Client
// =============================================================================

/// Everything a joiner needs to bootstrap its view of the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySnapshot {
    pub room_id: RoomCode,
    /// Current host, `None` only for a room nobody has joined yet.
    pub host: Option<UserId>,
    pub participants: Vec<ParticipantInfo>,
    pub current_video: VideoRef,
    /// Extrapolated to the moment the snapshot was taken.
    pub current_time: f64,
    pub is_playing: bool,
    pub messages: Vec<ChatMessage>,
    /// Whether the recipient of this snapshot is the host.
    pub is_host: bool,
    pub participant_count: usize,
    pub max_participants: usize,
}

/// Roster change broadcast when someone joins, leaves, drops, or returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUpdate {
    pub user_id: UserId,
    pub username: String,
    pub participants: Vec<ParticipantInfo>,
    pub participant_count: usize,
}

/// Messages the server pushes to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent to the joiner only, in reply to `join-watch-party`.
    WatchPartyJoined(PartySnapshot),

    ParticipantJoined(RosterUpdate),
    ParticipantLeft(RosterUpdate),
    /// The participant lost its connection and is inside the grace window.
    ParticipantDisconnected(RosterUpdate),
    /// The participant came back before its grace window ran out.
    ParticipantReconnected(RosterUpdate),

    HostChanged { new_host: UserId },

    /// Sent to everyone except `triggered_by`.
    VideoPlaySync { current_time: f64, triggered_by: UserId },
    /// Sent to everyone except `triggered_by`.
    VideoPauseSync { current_time: f64, triggered_by: UserId },
    /// Sent to everyone except `triggered_by`.
    VideoSeekSync { current_time: f64, triggered_by: UserId },

    /// Sent to everyone except `changed_by`.
    VideoChanged {
        video_url: String,
        title: String,
        changed_by: UserId,
    },

    /// Sent to everyone, the author included.
    NewMessage(ChatMessage),

    NewReaction {
        user_id: UserId,
        username: String,
        emoji: String,
    },

    HeartbeatAck { client_time: u64, server_time: i64 },

    /// Sent to the offending sender only.
    Error { message: String, code: ErrorCode },
}

impl ServerMessage {
    /// Builds an `error` message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code,
        }
    }

    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WatchPartyJoined(_) => "watch-party-joined",
            Self::ParticipantJoined(_) => "participant-joined",
            Self::ParticipantLeft(_) => "participant-left",
            Self::ParticipantDisconnected(_) => "participant-disconnected",
            Self::ParticipantReconnected(_) => "participant-reconnected",
            Self::HostChanged { .. } => "host-changed",
            Self::VideoPlaySync { .. } => "video-play-sync",
            Self::VideoPauseSync { .. } => "video-pause-sync",
            Self::VideoSeekSync { .. } => "video-seek-sync",
            Self::VideoChanged { .. } => "video-changed",
            Self::NewMessage(_) => "new-message",
            Self::NewReaction { .. } => "new-reaction",
            Self::HeartbeatAck { .. } => "heartbeat-ack",
            Self::Error { .. } => "error",
        }
    }
}
