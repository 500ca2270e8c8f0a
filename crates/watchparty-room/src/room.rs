//! Room actor: an isolated Tokio task that owns one watch party.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. Host identity, the participant list, playback,
//! chat and presence all live inside the actor; nothing about a room is
//! shared mutable state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use watchparty_protocol::{
    ParticipantInfo, PartySnapshot, RoomCode, RosterUpdate, SYSTEM_SENDER_ID, ServerMessage,
    UserId, VideoRef,
};
use watchparty_session::{Attach, ReconnectionManager};
use watchparty_transport::ConnectionId;

use crate::{ChatLog, Playback, RoomConfig, RoomError};

/// Channel sender for delivering outbound messages to one connection.
pub type ParticipantSender = mpsc::UnboundedSender<ServerMessage>;

/// Who an outbound message goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recipient {
    All,
    Only(UserId),
    /// Everyone but the issuer. Used for sync broadcasts so the host never
    /// hears its own transitions echoed back.
    AllExcept(UserId),
}

/// A host-only playback command.
#[derive(Debug, Clone, PartialEq)]
pub enum HostAction {
    Play { current_time: f64 },
    Pause { current_time: f64 },
    Seek { current_time: f64 },
    ChangeVideo(VideoRef),
}

/// Room metadata, as served by `GET /watch-party/{roomId}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomCode,
    pub video_url: String,
    pub title: String,
    pub host: Option<UserId>,
    pub participant_count: usize,
    pub max_participants: usize,
    pub is_playing: bool,
    pub current_time: f64,
    pub created_at: DateTime<Utc>,
}

/// Commands sent to a room actor through its channel.
///
/// Variants carrying a `oneshot::Sender` expect a reply; the rest are
/// fire-and-forget.
pub(crate) enum RoomCommand {
    Join {
        user_id: UserId,
        username: String,
        connection_id: ConnectionId,
        sender: ParticipantSender,
        reply: oneshot::Sender<Result<PartySnapshot, RoomError>>,
    },

    /// Explicit departure. Replies `true` if the room closed. With a
    /// connection id, only that live connection may leave.
    Leave {
        user_id: UserId,
        connection_id: Option<ConnectionId>,
        reply: oneshot::Sender<Result<bool, RoomError>>,
    },

    /// The connection carrying `user_id` was lost.
    Disconnect {
        user_id: UserId,
        connection_id: ConnectionId,
    },

    /// A grace timer fired. Sent by the timer task, never by callers.
    GraceExpired { user_id: UserId, epoch: u64 },

    Host {
        user_id: UserId,
        connection_id: ConnectionId,
        action: HostAction,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    Chat {
        user_id: UserId,
        connection_id: ConnectionId,
        text: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    Reaction {
        user_id: UserId,
        connection_id: ConnectionId,
        emoji: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    Summary {
        reply: oneshot::Sender<RoomSummary>,
    },

    Shutdown,
}

/// Handle to a running room actor. Used to send commands to it.
///
/// Cheap to clone: it's an `mpsc::Sender` plus the room's code. Once the
/// actor has stopped, every method returns [`RoomError::RoomNotFound`].
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomCode,
    generation: u64,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the room's code.
    pub fn room_id(&self) -> &RoomCode {
        &self.room_id
    }

    /// Distinguishes this actor from any earlier room that used the same
    /// code.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn gone(&self) -> RoomError {
        RoomError::RoomNotFound(self.room_id.clone())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| self.gone())?;
        reply_rx.await.map_err(|_| self.gone())
    }

    /// Joins (or re-joins) the room. The actor pushes `watch-party-joined`
    /// into `sender` itself, ahead of any broadcast the join triggers, and
    /// also returns the same snapshot.
    pub async fn join(
        &self,
        user_id: UserId,
        username: String,
        connection_id: ConnectionId,
        sender: ParticipantSender,
    ) -> Result<PartySnapshot, RoomError> {
        self.request(|reply| RoomCommand::Join {
            user_id,
            username,
            connection_id,
            sender,
            reply,
        })
        .await?
    }

    /// Removes a participant. Returns `true` if the room is now closed.
    ///
    /// When `connection_id` is given, the request is refused with
    /// [`RoomError::NotInRoom`] unless it is the participant's live
    /// connection, so a replaced socket cannot evict its successor.
    pub async fn leave(
        &self,
        user_id: UserId,
        connection_id: Option<ConnectionId>,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Leave {
            user_id,
            connection_id,
            reply,
        })
        .await?
    }

    /// Reports that `connection_id` closed (fire-and-forget).
    pub async fn disconnect(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Disconnect {
                user_id,
                connection_id,
            })
            .await
            .map_err(|_| self.gone())
    }

    /// Applies a host-only playback command.
    pub async fn host_action(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        action: HostAction,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Host {
            user_id,
            connection_id,
            action,
            reply,
        })
        .await?
    }

    /// Posts a chat line. The line reaches the author through the normal
    /// `new-message` broadcast.
    pub async fn post_message(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        text: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Chat {
            user_id,
            connection_id,
            text,
            reply,
        })
        .await?
    }

    /// Broadcasts an ephemeral reaction.
    pub async fn react(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        emoji: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Reaction {
            user_id,
            connection_id,
            emoji,
            reply,
        })
        .await?
    }

    /// Requests the room's metadata.
    pub async fn summary(&self) -> Result<RoomSummary, RoomError> {
        self.request(|reply| RoomCommand::Summary { reply }).await
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| self.gone())
    }
}

struct Participant {
    user_id: UserId,
    username: String,
    joined_at: DateTime<Utc>,
    sender: ParticipantSender,
}

/// The internal room actor state. Runs inside a Tokio task.
pub(crate) struct RoomActor {
    room_id: RoomCode,
    config: RoomConfig,
    created_at: DateTime<Utc>,
    host: Option<UserId>,
    /// In join order; the front is the next host.
    participants: Vec<Participant>,
    playback: Playback,
    chat: ChatLog,
    presence: ReconnectionManager,
    receiver: mpsc::Receiver<RoomCommand>,
    /// Handed to grace timers. Weak so a pending timer never keeps the
    /// channel open on its own.
    commands: mpsc::WeakSender<RoomCommand>,
    /// Until the first join, the room closes itself at this instant. The
    /// creator gets the same grace window as a dropped participant.
    unclaimed_until: Option<Instant>,
}

impl RoomActor {
    /// Runs the actor loop until shutdown or until the last participant
    /// is gone.
    pub(crate) async fn run(mut self) {
        tracing::info!(room = %self.room_id, "room actor started");

        loop {
            let cmd = tokio::select! {
                cmd = self.receiver.recv() => cmd,
                _ = unclaimed_deadline(self.unclaimed_until) => {
                    tracing::info!(room = %self.room_id, "nobody joined within the grace window, closing room");
                    break;
                }
            };
            let Some(cmd) = cmd else {
                break;
            };
            match cmd {
                RoomCommand::Join {
                    user_id,
                    username,
                    connection_id,
                    sender,
                    reply,
                } => {
                    let result = self.handle_join(user_id, username, connection_id, sender);
                    if result.is_ok() {
                        self.unclaimed_until = None;
                    }
                    let _ = reply.send(result);
                }
                RoomCommand::Leave {
                    user_id,
                    connection_id,
                    reply,
                } => {
                    let result = self.handle_leave(&user_id, connection_id);
                    let closed = matches!(result, Ok(true));
                    let _ = reply.send(result);
                    if closed {
                        break;
                    }
                }
                RoomCommand::Disconnect {
                    user_id,
                    connection_id,
                } => {
                    self.handle_disconnect(user_id, connection_id);
                }
                RoomCommand::GraceExpired { user_id, epoch } => {
                    if self.presence.expire(&user_id, epoch) && self.remove_participant(&user_id) {
                        break;
                    }
                }
                RoomCommand::Host {
                    user_id,
                    connection_id,
                    action,
                    reply,
                } => {
                    let result = self.handle_host_action(user_id, connection_id, action);
                    let _ = reply.send(result);
                }
                RoomCommand::Chat {
                    user_id,
                    connection_id,
                    text,
                    reply,
                } => {
                    let result = self.handle_chat(&user_id, connection_id, &text);
                    let _ = reply.send(result);
                }
                RoomCommand::Reaction {
                    user_id,
                    connection_id,
                    emoji,
                    reply,
                } => {
                    let result = self.handle_reaction(&user_id, connection_id, &emoji);
                    let _ = reply.send(result);
                }
                RoomCommand::Summary { reply } => {
                    let _ = reply.send(self.summary());
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room = %self.room_id, "room shutting down");
                    break;
                }
            }
        }

        tracing::info!(room = %self.room_id, "room actor stopped");
    }

    fn handle_join(
        &mut self,
        user_id: UserId,
        username: String,
        connection_id: ConnectionId,
        sender: ParticipantSender,
    ) -> Result<PartySnapshot, RoomError> {
        let username = username.trim().to_string();
        if user_id.as_str().is_empty() || user_id.as_str() == SYSTEM_SENDER_ID {
            return Err(RoomError::InvalidMessage(format!("unusable user id {user_id:?}")));
        }
        if username.is_empty() {
            return Err(RoomError::InvalidMessage("username must not be empty".into()));
        }

        // Returning participant: rebind, never re-count.
        if let Some(idx) = self.index_of(&user_id) {
            let attach = self.presence.attach(&user_id, connection_id);
            let participant = &mut self.participants[idx];
            participant.sender = sender;
            participant.username = username.clone();

            let snapshot = self.snapshot_for(&user_id);
            self.dispatch(
                Recipient::Only(user_id.clone()),
                ServerMessage::WatchPartyJoined(snapshot.clone()),
            );

            if attach == Attach::Reconnected {
                let update = self.roster_update(&user_id, &username);
                self.dispatch(
                    Recipient::AllExcept(user_id.clone()),
                    ServerMessage::ParticipantReconnected(update),
                );
                self.system_note(format!("{username} reconnected"));
            }
            tracing::info!(room = %self.room_id, %user_id, %connection_id, ?attach, "participant rejoined");
            return Ok(snapshot);
        }

        if self.participants.len() >= self.config.max_participants {
            tracing::warn!(room = %self.room_id, %user_id, "join rejected, room full");
            return Err(RoomError::RoomFull(self.room_id.clone()));
        }

        self.participants.push(Participant {
            user_id: user_id.clone(),
            username: username.clone(),
            joined_at: Utc::now(),
            sender,
        });
        self.presence.attach(&user_id, connection_id);
        if self.host.is_none() {
            self.host = Some(user_id.clone());
        }

        tracing::info!(
            room = %self.room_id,
            %user_id,
            %connection_id,
            participants = self.participants.len(),
            is_host = self.host.as_ref() == Some(&user_id),
            "participant joined"
        );

        let snapshot = self.snapshot_for(&user_id);
        self.dispatch(
            Recipient::Only(user_id.clone()),
            ServerMessage::WatchPartyJoined(snapshot.clone()),
        );
        let update = self.roster_update(&user_id, &username);
        self.dispatch(
            Recipient::AllExcept(user_id),
            ServerMessage::ParticipantJoined(update),
        );
        self.system_note(format!("{username} joined the watch party"));

        Ok(snapshot)
    }

    fn handle_leave(
        &mut self,
        user_id: &UserId,
        connection_id: Option<ConnectionId>,
    ) -> Result<bool, RoomError> {
        match connection_id {
            Some(connection_id) => {
                self.require_live(user_id, connection_id)?;
            }
            None if self.index_of(user_id).is_none() => {
                return Err(self.not_in_room(user_id));
            }
            None => {}
        }
        self.presence.remove(user_id);
        Ok(self.remove_participant(user_id))
    }

    fn handle_disconnect(&mut self, user_id: UserId, connection_id: ConnectionId) {
        let Some(idx) = self.index_of(&user_id) else {
            return;
        };

        let commands = self.commands.clone();
        let timer_user = user_id.clone();
        let detached = self.presence.detach(&user_id, connection_id, move |epoch| async move {
            if let Some(commands) = commands.upgrade() {
                let _ = commands
                    .send(RoomCommand::GraceExpired {
                        user_id: timer_user,
                        epoch,
                    })
                    .await;
            }
        });

        match detached {
            Ok(_) => {
                tracing::info!(
                    room = %self.room_id,
                    %user_id,
                    in_grace = self.presence.disconnected_count(),
                    "participant disconnected"
                );
                let username = self.participants[idx].username.clone();
                let update = self.roster_update(&user_id, &username);
                self.dispatch(
                    Recipient::AllExcept(user_id),
                    ServerMessage::ParticipantDisconnected(update),
                );
            }
            Err(err) => {
                tracing::debug!(room = %self.room_id, %err, "ignoring disconnect");
            }
        }
    }

    fn handle_host_action(
        &mut self,
        user_id: UserId,
        connection_id: ConnectionId,
        action: HostAction,
    ) -> Result<(), RoomError> {
        self.require_live(&user_id, connection_id)?;
        if self.host.as_ref() != Some(&user_id) {
            tracing::warn!(room = %self.room_id, %user_id, ?action, "playback command from non-host");
            return Err(RoomError::InvalidHostAction(user_id));
        }

        let sync = match action {
            HostAction::Play { current_time } => {
                self.playback.play(current_time)?;
                Some(ServerMessage::VideoPlaySync {
                    current_time,
                    triggered_by: user_id.clone(),
                })
            }
            HostAction::Pause { current_time } => {
                self.playback.pause(current_time)?;
                Some(ServerMessage::VideoPauseSync {
                    current_time,
                    triggered_by: user_id.clone(),
                })
            }
            HostAction::Seek { current_time } => {
                if self.playback.seek(current_time, self.config.seek_epsilon)? {
                    Some(ServerMessage::VideoSeekSync {
                        current_time,
                        triggered_by: user_id.clone(),
                    })
                } else {
                    tracing::debug!(room = %self.room_id, current_time, "seek within epsilon, not broadcast");
                    None
                }
            }
            HostAction::ChangeVideo(video) => {
                self.playback.change_video(video.clone())?;
                tracing::info!(room = %self.room_id, video_url = %video.video_url, "video changed");
                Some(ServerMessage::VideoChanged {
                    video_url: video.video_url,
                    title: video.title,
                    changed_by: user_id.clone(),
                })
            }
        };

        if let Some(msg) = sync {
            tracing::debug!(room = %self.room_id, kind = msg.kind(), "broadcasting sync");
            self.dispatch(Recipient::AllExcept(user_id), msg);
        }
        Ok(())
    }

    fn handle_chat(
        &mut self,
        user_id: &UserId,
        connection_id: ConnectionId,
        text: &str,
    ) -> Result<(), RoomError> {
        let idx = self.require_live(user_id, connection_id)?;
        let message = self
            .chat
            .post(user_id, &self.participants[idx].username, text)?;
        self.dispatch(Recipient::All, ServerMessage::NewMessage(message));
        Ok(())
    }

    fn handle_reaction(
        &mut self,
        user_id: &UserId,
        connection_id: ConnectionId,
        emoji: &str,
    ) -> Result<(), RoomError> {
        let idx = self.require_live(user_id, connection_id)?;
        let emoji = emoji.trim();
        let chars = emoji.chars().count();
        if chars == 0 || chars > self.config.max_emoji_chars {
            return Err(RoomError::InvalidMessage(format!(
                "reaction must be 1 to {} characters",
                self.config.max_emoji_chars
            )));
        }
        let msg = ServerMessage::NewReaction {
            user_id: user_id.clone(),
            username: self.participants[idx].username.clone(),
            emoji: emoji.to_string(),
        };
        self.dispatch(Recipient::All, msg);
        Ok(())
    }

    /// Removes a participant already dropped from presence tracking.
    /// Returns `true` if that emptied the room.
    fn remove_participant(&mut self, user_id: &UserId) -> bool {
        let Some(idx) = self.index_of(user_id) else {
            return false;
        };
        let departed = self.participants.remove(idx);

        tracing::info!(
            room = %self.room_id,
            %user_id,
            participants = self.participants.len(),
            "participant left"
        );

        if self.participants.is_empty() {
            self.host = None;
            tracing::info!(room = %self.room_id, "last participant gone, closing room");
            return true;
        }

        let update = self.roster_update(user_id, &departed.username);
        self.dispatch(Recipient::All, ServerMessage::ParticipantLeft(update));
        self.system_note(format!("{} left the watch party", departed.username));

        if self.host.as_ref() == Some(user_id) {
            self.migrate_host();
        }
        false
    }

    /// Hands the host role to the longest-present participant.
    fn migrate_host(&mut self) {
        let Some(next) = self.participants.first() else {
            self.host = None;
            return;
        };
        let new_host = next.user_id.clone();
        let username = next.username.clone();
        self.host = Some(new_host.clone());

        tracing::info!(room = %self.room_id, %new_host, "host migrated");
        self.dispatch(Recipient::All, ServerMessage::HostChanged { new_host });
        self.system_note(format!("{username} is now the host"));
    }

    fn system_note(&mut self, text: String) {
        let note = self.chat.system(text);
        self.dispatch(Recipient::All, ServerMessage::NewMessage(note));
    }

    /// Looks up a participant speaking through its current connection.
    fn require_live(
        &self,
        user_id: &UserId,
        connection_id: ConnectionId,
    ) -> Result<usize, RoomError> {
        match self.index_of(user_id) {
            Some(idx) if self.presence.connection(user_id) == Some(connection_id) => Ok(idx),
            _ => Err(self.not_in_room(user_id)),
        }
    }

    fn not_in_room(&self, user_id: &UserId) -> RoomError {
        RoomError::NotInRoom(user_id.clone(), self.room_id.clone())
    }

    fn index_of(&self, user_id: &UserId) -> Option<usize> {
        self.participants.iter().position(|p| &p.user_id == user_id)
    }

    fn roster(&self) -> Vec<ParticipantInfo> {
        self.participants
            .iter()
            .map(|p| ParticipantInfo {
                user_id: p.user_id.clone(),
                username: p.username.clone(),
                is_host: self.host.as_ref() == Some(&p.user_id),
                connected: self.presence.is_connected(&p.user_id),
                joined_at: p.joined_at,
            })
            .collect()
    }

    fn roster_update(&self, user_id: &UserId, username: &str) -> RosterUpdate {
        RosterUpdate {
            user_id: user_id.clone(),
            username: username.to_string(),
            participants: self.roster(),
            participant_count: self.participants.len(),
        }
    }

    fn snapshot_for(&self, user_id: &UserId) -> PartySnapshot {
        PartySnapshot {
            room_id: self.room_id.clone(),
            host: self.host.clone(),
            participants: self.roster(),
            current_video: self.playback.video().clone(),
            current_time: self.playback.current_time(),
            is_playing: self.playback.is_playing(),
            messages: self.chat.recent(self.config.snapshot_history),
            is_host: self.host.as_ref() == Some(user_id),
            participant_count: self.participants.len(),
            max_participants: self.config.max_participants,
        }
    }

    fn summary(&self) -> RoomSummary {
        let video = self.playback.video();
        RoomSummary {
            room_id: self.room_id.clone(),
            video_url: video.video_url.clone(),
            title: video.title.clone(),
            host: self.host.clone(),
            participant_count: self.participants.len(),
            max_participants: self.config.max_participants,
            is_playing: self.playback.is_playing(),
            current_time: self.playback.current_time(),
            created_at: self.created_at,
        }
    }

    /// Delivers a message. A closed receiver means the connection is gone;
    /// the message is dropped and presence tracking takes it from there.
    fn dispatch(&self, recipient: Recipient, msg: ServerMessage) {
        match recipient {
            Recipient::All => {
                for p in &self.participants {
                    let _ = p.sender.send(msg.clone());
                }
            }
            Recipient::Only(user_id) => {
                if let Some(p) = self.participants.iter().find(|p| p.user_id == user_id) {
                    let _ = p.sender.send(msg);
                }
            }
            Recipient::AllExcept(excluded) => {
                for p in self.participants.iter().filter(|p| p.user_id != excluded) {
                    let _ = p.sender.send(msg.clone());
                }
            }
        }
    }
}

/// Resolves at `deadline`, or never if there is none.
async fn unclaimed_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Builds a room actor and its handle. The caller spawns
/// [`RoomActor::run`].
///
/// `config.channel_size` controls backpressure: if the channel fills up,
/// senders wait.
pub(crate) fn new_room(
    room_id: RoomCode,
    video: VideoRef,
    config: RoomConfig,
    generation: u64,
) -> (RoomHandle, RoomActor) {
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));
    let presence = ReconnectionManager::new(config.session_config());

    let actor = RoomActor {
        room_id: room_id.clone(),
        created_at: Utc::now(),
        host: None,
        participants: Vec::new(),
        playback: Playback::new(video),
        chat: ChatLog::new(config.chat_retention, config.max_message_chars),
        unclaimed_until: Some(Instant::now() + presence.grace()),
        presence,
        receiver: rx,
        commands: tx.downgrade(),
        config,
    };

    let handle = RoomHandle {
        room_id,
        generation,
        sender: tx,
    };
    (handle, actor)
}
