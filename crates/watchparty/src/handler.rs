//! Per-connection handler: decode, route to the bound room, forward
//! outbound messages.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Loop: wait for an inbound frame or an outbound room message.
//!   2. Inbound frames are decoded to [`ClientMessage`] and routed. Until a
//!      successful `join-watch-party` only joins and heartbeats are useful.
//!   3. Outbound messages arrive on this connection's unbounded channel
//!      (fed by the room actor and by the handler itself) and are encoded
//!      and written in order.
//!   4. On close, error or (when configured) idle timeout, the [`ConnectionGuard`] reports
//!      the loss to the room, which starts the grace timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use watchparty_protocol::{
    ClientMessage, Codec, ErrorCode, RoomCode, ServerMessage, UserId, VideoRef,
};
use watchparty_room::{HostAction, RoomError, RoomHandle, RoomRegistry};
use watchparty_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::WatchPartyError;

/// Handler settings.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// When set, a connection that sends no frame at all (pings and pongs
    /// count) for this long is closed and treated as lost. Default: off.
    pub idle_timeout: Option<Duration>,
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: RoomRegistry,
    pub(crate) codec: C,
    pub(crate) connection: ConnectionConfig,
}

/// The room a connection has joined, and as whom.
struct Binding {
    room: RoomHandle,
    user_id: UserId,
}

impl Binding {
    fn code(&self) -> &RoomCode {
        self.room.room_id()
    }
}

/// Drop guard that reports the connection loss to its room when the
/// handler exits.
///
/// This ensures the grace timer starts even if the handler panics. Since
/// `Drop` is synchronous, we spawn a fire-and-forget task for the send.
struct ConnectionGuard {
    connection_id: ConnectionId,
    binding: Option<Binding>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.take() {
            let connection_id = self.connection_id;
            tokio::spawn(async move {
                let _ = binding.room.disconnect(binding.user_id, connection_id).await;
            });
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), WatchPartyError> {
    let connection_id = conn.id();
    tracing::debug!(%connection_id, "handling new connection");

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut guard = ConnectionGuard {
        connection_id,
        binding: None,
    };
    let idle = state.connection.idle_timeout;
    let mut deadline = idle.map(|idle| conn.last_activity() + idle);

    loop {
        tokio::select! {
            inbound = conn.recv() => {
                let data = match inbound {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%connection_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%connection_id, error = %e, "recv error");
                        break;
                    }
                };
                handle_frame(&state, &mut guard, &outbound_tx, &data).await;
            }
            _ = idle_expired(deadline) => {
                // Control frames never surface from recv, so the deadline
                // is checked against the transport's own activity clock.
                let next = idle.map(|idle| conn.last_activity() + idle);
                if next.is_some_and(|next| next > Instant::now()) {
                    deadline = next;
                } else {
                    tracing::info!(%connection_id, "connection idle, closing");
                    let _ = conn.close().await;
                    break;
                }
            }
            Some(msg) = outbound_rx.recv() => {
                let bytes = state.codec.encode(&msg)?;
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(%connection_id, error = %e, "send failed");
                    break;
                }
            }
        }
    }

    // guard drops here → room hears about the disconnect.
    Ok(())
}

async fn idle_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Decodes and routes one inbound frame.
async fn handle_frame<C: Codec>(
    state: &ServerState<C>,
    guard: &mut ConnectionGuard,
    outbound: &mpsc::UnboundedSender<ServerMessage>,
    data: &[u8],
) {
    let connection_id = guard.connection_id;
    let reply = |msg: ServerMessage| {
        let _ = outbound.send(msg);
    };

    let msg: ClientMessage = match state.codec.decode(data) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(%connection_id, error = %e, "undecodable message");
            reply(ServerMessage::error(
                ErrorCode::InvalidMessage,
                format!("malformed message: {e}"),
            ));
            return;
        }
    };
    tracing::debug!(%connection_id, kind = msg.kind(), "inbound message");

    let result = match msg {
        ClientMessage::Heartbeat { client_time } => {
            reply(ServerMessage::HeartbeatAck {
                client_time,
                server_time: Utc::now().timestamp_millis(),
            });
            Ok(())
        }
        ClientMessage::JoinWatchParty {
            room_id,
            user_id,
            username,
        } => join(state, guard, outbound, room_id, user_id, username).await,
        ClientMessage::LeaveWatchParty => leave(state, guard).await,
        ClientMessage::VideoPlay { current_time } => {
            host_action(guard, HostAction::Play { current_time }).await
        }
        ClientMessage::VideoPause { current_time } => {
            host_action(guard, HostAction::Pause { current_time }).await
        }
        ClientMessage::VideoSeek { current_time } => {
            host_action(guard, HostAction::Seek { current_time }).await
        }
        ClientMessage::ChangeVideo { video_url, title } => {
            host_action(guard, HostAction::ChangeVideo(VideoRef::new(video_url, title))).await
        }
        ClientMessage::SendMessage { message } => chat(guard, message).await,
        ClientMessage::SendReaction { emoji } => react(guard, emoji).await,
    };

    if let Err(rejection) = result {
        let (code, message) = rejection.describe();
        tracing::debug!(%connection_id, %code, %message, "request rejected");
        reply(ServerMessage::error(code, message));
    }
}

/// Why a request was refused.
enum Rejection {
    Room(RoomError),
    /// The connection has not joined a room.
    Unbound,
}

impl Rejection {
    fn describe(self) -> (ErrorCode, String) {
        match self {
            Self::Room(err) => (err.code(), err.to_string()),
            Self::Unbound => (
                ErrorCode::NotInRoom,
                "join a watch party before sending this message".into(),
            ),
        }
    }
}

fn bound(guard: &ConnectionGuard) -> Result<&Binding, Rejection> {
    guard.binding.as_ref().ok_or(Rejection::Unbound)
}

async fn join<C: Codec>(
    state: &ServerState<C>,
    guard: &mut ConnectionGuard,
    outbound: &mpsc::UnboundedSender<ServerMessage>,
    room_id: RoomCode,
    user_id: UserId,
    username: String,
) -> Result<(), Rejection> {
    if let Some(binding) = &guard.binding {
        if binding.code() != &room_id || binding.user_id != user_id {
            return Err(Rejection::Room(RoomError::AlreadyInRoom(binding.code().clone())));
        }
    }

    let room = state.registry.handle(&room_id).await.map_err(Rejection::Room)?;
    room.join(user_id.clone(), username, guard.connection_id, outbound.clone())
        .await
        .map_err(Rejection::Room)?;

    tracing::info!(
        connection_id = %guard.connection_id,
        room = %room_id,
        %user_id,
        "connection bound to room"
    );
    guard.binding = Some(Binding { room, user_id });
    Ok(())
}

async fn leave<C: Codec>(
    state: &ServerState<C>,
    guard: &mut ConnectionGuard,
) -> Result<(), Rejection> {
    let binding = bound(guard)?;
    let code = binding.code().clone();
    let result = state
        .registry
        .leave_room_from(&code, binding.user_id.clone(), guard.connection_id)
        .await;

    match result {
        // Room already gone: nothing left to leave, just unbind.
        Ok(()) | Err(RoomError::RoomNotFound(_)) => {
            guard.binding = None;
            Ok(())
        }
        // This connection was replaced; it no longer speaks for the user.
        Err(err @ RoomError::NotInRoom(..)) => {
            guard.binding = None;
            Err(Rejection::Room(err))
        }
        Err(err) => Err(Rejection::Room(err)),
    }
}

async fn host_action(guard: &ConnectionGuard, action: HostAction) -> Result<(), Rejection> {
    let binding = bound(guard)?;
    binding
        .room
        .host_action(binding.user_id.clone(), guard.connection_id, action)
        .await
        .map_err(Rejection::Room)
}

async fn chat(guard: &ConnectionGuard, text: String) -> Result<(), Rejection> {
    let binding = bound(guard)?;
    binding
        .room
        .post_message(binding.user_id.clone(), guard.connection_id, text)
        .await
        .map_err(Rejection::Room)
}

async fn react(guard: &ConnectionGuard, emoji: String) -> Result<(), Rejection> {
    let binding = bound(guard)?;
    binding
        .room
        .react(binding.user_id.clone(), guard.connection_id, emoji)
        .await
        .map_err(Rejection::Room)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_default_has_no_idle_timeout() {
        assert_eq!(ConnectionConfig::default().idle_timeout, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expired_without_deadline_never_fires() {
        let fired = tokio::time::timeout(Duration::from_secs(3600), idle_expired(None)).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expired_fires_at_deadline() {
        let deadline = Instant::now() + Duration::from_secs(5);
        idle_expired(Some(deadline)).await;
        assert!(Instant::now() >= deadline);
    }
}
