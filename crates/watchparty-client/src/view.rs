//! Local mirror of a party, kept current by applying server messages.

use tokio::time::Instant;
use watchparty_protocol::{
    ChatMessage, ParticipantInfo, PartySnapshot, RoomCode, ServerMessage, UserId, VideoRef,
};

/// What this client believes the room looks like.
///
/// Built from the `watch-party-joined` snapshot and updated by
/// [`PartyView::apply`]. A later snapshot (after a reconnect) replaces the
/// whole view, so nothing is ever double-counted.
#[derive(Debug, Clone)]
pub struct PartyView {
    user_id: UserId,
    room_id: RoomCode,
    host: Option<UserId>,
    participants: Vec<ParticipantInfo>,
    max_participants: usize,
    video: VideoRef,
    position: f64,
    is_playing: bool,
    anchored_at: Instant,
    messages: Vec<ChatMessage>,
    retention: usize,
}

impl PartyView {
    /// Starts a view for `user_id` from a join snapshot, keeping at most
    /// `retention` chat messages.
    pub fn from_snapshot(user_id: UserId, snapshot: PartySnapshot, retention: usize) -> Self {
        let mut view = Self {
            user_id,
            room_id: snapshot.room_id,
            host: snapshot.host,
            participants: snapshot.participants,
            max_participants: snapshot.max_participants,
            video: snapshot.current_video,
            position: snapshot.current_time,
            is_playing: snapshot.is_playing,
            anchored_at: Instant::now(),
            messages: snapshot.messages,
            retention,
        };
        view.evict_old_messages();
        view
    }

    pub fn room_id(&self) -> &RoomCode {
        &self.room_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn host(&self) -> Option<&UserId> {
        self.host.as_ref()
    }

    pub fn is_host(&self) -> bool {
        self.host.as_ref() == Some(&self.user_id)
    }

    pub fn participants(&self) -> &[ParticipantInfo] {
        &self.participants
    }

    pub fn max_participants(&self) -> usize {
        self.max_participants
    }

    pub fn video(&self) -> &VideoRef {
        &self.video
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Playback position in seconds, extrapolated while playing.
    pub fn current_time(&self) -> f64 {
        if self.is_playing {
            self.position + self.anchored_at.elapsed().as_secs_f64()
        } else {
            self.position
        }
    }

    /// The most recent chat messages in `seq` order, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Folds one server message into the view.
    pub fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::WatchPartyJoined(snapshot) => {
                *self =
                    Self::from_snapshot(self.user_id.clone(), snapshot.clone(), self.retention);
            }
            ServerMessage::ParticipantJoined(update)
            | ServerMessage::ParticipantLeft(update)
            | ServerMessage::ParticipantDisconnected(update)
            | ServerMessage::ParticipantReconnected(update) => {
                self.participants = update.participants.clone();
                if let Some(host) = self.participants.iter().find(|p| p.is_host) {
                    self.host = Some(host.user_id.clone());
                }
            }
            ServerMessage::HostChanged { new_host } => {
                self.host = Some(new_host.clone());
                for p in &mut self.participants {
                    p.is_host = &p.user_id == new_host;
                }
            }
            ServerMessage::VideoPlaySync { current_time, .. } => {
                self.anchor(*current_time, true);
            }
            ServerMessage::VideoPauseSync { current_time, .. } => {
                self.anchor(*current_time, false);
            }
            ServerMessage::VideoSeekSync { current_time, .. } => {
                self.anchor(*current_time, self.is_playing);
            }
            ServerMessage::VideoChanged {
                video_url, title, ..
            } => {
                self.video = VideoRef::new(video_url.clone(), title.clone());
                self.anchor(0.0, false);
            }
            ServerMessage::NewMessage(message) => {
                // Sequence numbers only grow; anything older is a replay.
                if self.messages.last().is_none_or(|last| last.seq < message.seq) {
                    self.messages.push(message.clone());
                    self.evict_old_messages();
                }
            }
            ServerMessage::NewReaction { .. }
            | ServerMessage::HeartbeatAck { .. }
            | ServerMessage::Error { .. } => {}
        }
    }

    /// Records a transition this client issued itself. The server never
    /// echoes it back.
    pub(crate) fn apply_local(&mut self, current_time: f64, is_playing: bool) {
        self.anchor(current_time, is_playing);
    }

    pub(crate) fn apply_local_video(&mut self, video: VideoRef) {
        self.video = video;
        self.anchor(0.0, false);
    }

    fn evict_old_messages(&mut self) {
        let excess = self.messages.len().saturating_sub(self.retention);
        if excess > 0 {
            self.messages.drain(..excess);
        }
    }

    fn anchor(&mut self, position: f64, is_playing: bool) {
        self.position = position;
        self.is_playing = is_playing;
        self.anchored_at = Instant::now();
    }
}
