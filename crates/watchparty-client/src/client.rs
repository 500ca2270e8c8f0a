//! The client controller and its connection driver.
//!
//! [`WatchPartyClient::join`] dials the server, waits for the join snapshot
//! and hands back a [`PartyHandle`]. Behind the handle a driver task owns
//! the socket:
//!
//! ```text
//! PartyHandle ──commands──→ driver ──frames──→ server
//!      ↑                      │
//!      └──────events──────────┘   (and updates the shared PartyView)
//! ```
//!
//! When the socket drops, the driver redials under the configured
//! [`ReconnectPolicy`](watchparty_session::ReconnectPolicy) and re-sends
//! `join-watch-party` with the same user id. The server treats that as the
//! same participant, so nothing is duplicated.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use watchparty_protocol::{
    ClientMessage, Codec, JsonCodec, PartySnapshot, RoomCode, ServerMessage, UserId, VideoRef,
};
use watchparty_session::Backoff;
use watchparty_transport::{ClientConnection, Connection};

use crate::{ClientConfig, ClientError, PartyView};

/// Something the application should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A server message, already folded into the [`PartyView`].
    Message(ServerMessage),
    /// The connection dropped; redialing after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Back in the room. A fresh `watch-party-joined` precedes this event.
    Reconnected,
    /// Reconnection gave up. The handle is dead.
    ConnectionLost,
}

/// Entry point for joining watch parties.
#[derive(Debug, Clone)]
pub struct WatchPartyClient {
    config: ClientConfig,
    codec: JsonCodec,
}

impl WatchPartyClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            codec: JsonCodec,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Joins `room_id` as `user_id`.
    ///
    /// # Errors
    /// [`ClientError::JoinRejected`] if the server refuses (unknown room,
    /// full room, ...), or a transport error if the server is unreachable.
    pub async fn join(
        &self,
        room_id: RoomCode,
        user_id: UserId,
        username: impl Into<String>,
    ) -> Result<PartyHandle, ClientError> {
        let identity = Identity {
            room_id,
            user_id,
            username: username.into(),
        };
        let (conn, snapshot) = dial(&self.config.url, &self.codec, &identity).await?;
        tracing::info!(room = %identity.room_id, user_id = %identity.user_id, "joined watch party");

        let view = Arc::new(RwLock::new(PartyView::from_snapshot(
            identity.user_id.clone(),
            snapshot,
            self.config.chat_history,
        )));
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            conn,
            codec: self.codec,
            identity,
            config: self.config.clone(),
            commands: commands_rx,
            events: events_tx,
            view: Arc::clone(&view),
            backoff: self.config.reconnect.backoff(),
        };
        let task = tokio::spawn(driver.run());

        Ok(PartyHandle {
            commands: commands_tx,
            events: events_rx,
            view,
            enable_reactions: self.config.enable_reactions,
            driver: Some(task),
        })
    }
}

/// A joined party.
///
/// Release it with [`leave`](Self::leave). Dropping the handle instead
/// closes the socket without leaving, which the server treats as a lost
/// connection.
pub struct PartyHandle {
    commands: mpsc::Sender<Command>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    view: Arc<RwLock<PartyView>>,
    enable_reactions: bool,
    driver: Option<JoinHandle<()>>,
}

impl PartyHandle {
    /// A copy of the current local view.
    pub async fn view(&self) -> PartyView {
        self.view.read().await.clone()
    }

    /// Waits for the next event. `None` once the driver has stopped and
    /// every event has been read.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    pub async fn play(&self, current_time: f64) -> Result<(), ClientError> {
        self.send(ClientMessage::VideoPlay { current_time }).await?;
        self.apply_if_host(|view| view.apply_local(current_time, true)).await;
        Ok(())
    }

    pub async fn pause(&self, current_time: f64) -> Result<(), ClientError> {
        self.send(ClientMessage::VideoPause { current_time }).await?;
        self.apply_if_host(|view| view.apply_local(current_time, false)).await;
        Ok(())
    }

    pub async fn seek(&self, current_time: f64) -> Result<(), ClientError> {
        self.send(ClientMessage::VideoSeek { current_time }).await?;
        self.apply_if_host(|view| {
            let playing = view.is_playing();
            view.apply_local(current_time, playing);
        })
        .await;
        Ok(())
    }

    pub async fn change_video(
        &self,
        video_url: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<(), ClientError> {
        let video = VideoRef::new(video_url, title);
        self.send(ClientMessage::ChangeVideo {
            video_url: video.video_url.clone(),
            title: video.title.clone(),
        })
        .await?;
        self.apply_if_host(|view| view.apply_local_video(video)).await;
        Ok(())
    }

    pub async fn send_message(&self, message: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientMessage::SendMessage {
            message: message.into(),
        })
        .await
    }

    /// # Errors
    /// [`ClientError::ReactionsDisabled`] without touching the network if
    /// this client was configured without reactions.
    pub async fn react(&self, emoji: impl Into<String>) -> Result<(), ClientError> {
        if !self.enable_reactions {
            return Err(ClientError::ReactionsDisabled);
        }
        self.send(ClientMessage::SendReaction {
            emoji: emoji.into(),
        })
        .await
    }

    /// Leaves the party, closes the socket, and stops the driver.
    pub async fn leave(mut self) -> Result<(), ClientError> {
        let (done_tx, done_rx) = oneshot::channel();
        let result = match self.commands.send(Command::Leave(done_tx)).await {
            Ok(()) => done_rx.await.unwrap_or(Ok(())),
            // Driver already gone: nothing left to release.
            Err(_) => Ok(()),
        };
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
        result
    }

    async fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.commands
            .send(Command::Send(msg))
            .await
            .map_err(|_| ClientError::ConnectionLost)
    }

    /// Host transitions are never echoed back, so the host's own view is
    /// updated here.
    async fn apply_if_host(&self, f: impl FnOnce(&mut PartyView)) {
        let mut view = self.view.write().await;
        if view.is_host() {
            f(&mut view);
        }
    }
}

enum Command {
    Send(ClientMessage),
    Leave(oneshot::Sender<Result<(), ClientError>>),
}

#[derive(Debug, Clone)]
struct Identity {
    room_id: RoomCode,
    user_id: UserId,
    username: String,
}

/// Why the driver stopped pumping a connection.
enum Exit {
    Left,
    Lost,
}

struct Driver {
    conn: ClientConnection,
    codec: JsonCodec,
    identity: Identity,
    config: ClientConfig,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<ClientEvent>,
    view: Arc<RwLock<PartyView>>,
    backoff: Backoff,
}

impl Driver {
    async fn run(mut self) {
        loop {
            match self.pump().await {
                Exit::Left => return,
                Exit::Lost => match self.reconnect().await {
                    Some(conn) => self.conn = conn,
                    None => return,
                },
            }
        }
    }

    /// Shuttles frames until the connection drops or the handle leaves.
    async fn pump(&mut self) -> Exit {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                frame = self.conn.recv() => match frame {
                    Ok(Some(data)) => self.deliver(&data).await,
                    Ok(None) => {
                        tracing::info!(room = %self.identity.room_id, "server closed the connection");
                        return Exit::Lost;
                    }
                    Err(e) => {
                        tracing::warn!(room = %self.identity.room_id, error = %e, "connection lost");
                        return Exit::Lost;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(msg)) => {
                        if let Err(e) = self.send(&msg).await {
                            tracing::warn!(kind = msg.kind(), error = %e, "send failed");
                            return Exit::Lost;
                        }
                    }
                    Some(Command::Leave(done)) => {
                        let result = self.send(&ClientMessage::LeaveWatchParty).await;
                        let _ = self.conn.close().await;
                        tracing::info!(room = %self.identity.room_id, "left watch party");
                        let _ = done.send(result);
                        return Exit::Left;
                    }
                    None => {
                        let _ = self.conn.close().await;
                        return Exit::Left;
                    }
                },
                _ = heartbeat.tick() => {
                    let msg = ClientMessage::Heartbeat { client_time: unix_millis() };
                    if self.send(&msg).await.is_err() {
                        return Exit::Lost;
                    }
                }
            }
        }
    }

    /// Redials until joined again or the policy runs out. `None` means the
    /// driver should stop.
    async fn reconnect(&mut self) -> Option<ClientConnection> {
        while let Some(delay) = self.backoff.next_delay() {
            let attempt = self.backoff.attempt();
            tracing::info!(room = %self.identity.room_id, attempt, ?delay, "reconnecting");
            self.emit(ClientEvent::Reconnecting { attempt, delay });

            if !self.wait(delay).await {
                return None;
            }

            match dial(&self.config.url, &self.codec, &self.identity).await {
                Ok((conn, snapshot)) => {
                    // The next outage starts from the first delay again.
                    self.backoff.reset();
                    let msg = ServerMessage::WatchPartyJoined(snapshot);
                    self.view.write().await.apply(&msg);
                    self.emit(ClientEvent::Message(msg));
                    self.emit(ClientEvent::Reconnected);
                    tracing::info!(room = %self.identity.room_id, attempt, "reconnected");
                    return Some(conn);
                }
                // The room is gone or full; redialing will not change that.
                Err(ClientError::JoinRejected { code, message }) => {
                    tracing::warn!(room = %self.identity.room_id, %code, "rejoin refused");
                    self.emit(ClientEvent::Message(ServerMessage::error(code, message)));
                    break;
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "reconnect attempt failed");
                }
            }
        }

        tracing::warn!(room = %self.identity.room_id, "giving up, connection lost");
        self.emit(ClientEvent::ConnectionLost);
        None
    }

    /// Sleeps for `delay` while still answering the handle. Returns `false`
    /// if the handle left or was dropped in the meantime.
    async fn wait(&mut self, delay: Duration) -> bool {
        let wake = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Send(msg)) => {
                        tracing::debug!(kind = msg.kind(), "dropping message while disconnected");
                    }
                    Some(Command::Leave(done)) => {
                        let _ = done.send(Ok(()));
                        return false;
                    }
                    None => return false,
                },
            }
        }
    }

    async fn deliver(&mut self, data: &[u8]) {
        let msg: ServerMessage = match self.codec.decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable server message");
                return;
            }
        };
        tracing::debug!(kind = msg.kind(), "server message");
        self.view.write().await.apply(&msg);
        self.emit(ClientEvent::Message(msg));
    }

    async fn send(&self, msg: &ClientMessage) -> Result<(), ClientError> {
        let bytes = self.codec.encode(msg)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

/// Connects and joins. Resolves once the server answers the join.
async fn dial(
    url: &str,
    codec: &JsonCodec,
    identity: &Identity,
) -> Result<(ClientConnection, PartySnapshot), ClientError> {
    let conn = ClientConnection::connect(url).await?;
    let join = ClientMessage::JoinWatchParty {
        room_id: identity.room_id.clone(),
        user_id: identity.user_id.clone(),
        username: identity.username.clone(),
    };
    conn.send(&codec.encode(&join)?).await?;

    loop {
        let Some(data) = conn.recv().await? else {
            return Err(ClientError::JoinInterrupted);
        };
        match codec.decode::<ServerMessage>(&data)? {
            ServerMessage::WatchPartyJoined(snapshot) => return Ok((conn, snapshot)),
            ServerMessage::Error { code, message } => {
                let _ = conn.close().await;
                return Err(ClientError::JoinRejected { code, message });
            }
            other => {
                tracing::debug!(kind = other.kind(), "ignoring message before join reply");
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
