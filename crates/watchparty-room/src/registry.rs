//! Room registry: creates rooms, tracks them by code, routes to them.
//!
//! The code → handle map is the only state shared between connections.
//! Its lock is held for a single insert, lookup or remove and is never held
//! across a room operation, so one busy room never stalls another.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use tokio::sync::Mutex;
use watchparty_protocol::{PartySnapshot, RoomCode, UserId, VideoRef};
use watchparty_transport::ConnectionId;

use crate::room::new_room;
use crate::{ParticipantSender, RoomConfig, RoomError, RoomHandle, RoomSummary};

/// Counter for telling apart rooms that reuse a code.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// How many fresh codes `create_room` tries before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 32;

/// Produces candidate room codes. Candidates that do not parse as a
/// [`RoomCode`] are discarded and count as a failed attempt.
pub type CodeGenerator = Arc<dyn Fn() -> String + Send + Sync>;

type RoomMap = Arc<Mutex<HashMap<RoomCode, RoomHandle>>>;

/// Creates, tracks, and looks up rooms.
///
/// Cheap to clone; clones share the same map.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: RoomMap,
    config: RoomConfig,
    generate_code: CodeGenerator,
}

impl RoomRegistry {
    /// Creates an empty registry whose rooms use `config`.
    pub fn new(config: RoomConfig) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            config,
            generate_code: Arc::new(random_code),
        }
    }

    /// Replaces the room code source.
    pub fn with_code_generator(mut self, generate_code: CodeGenerator) -> Self {
        self.generate_code = generate_code;
        self
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Creates an empty room watching `video` and returns its code.
    ///
    /// # Errors
    /// [`RoomError::RoomCreationFailed`] if no unused code turned up within
    /// [`MAX_CODE_ATTEMPTS`] tries.
    pub async fn create_room(&self, video: VideoRef) -> Result<RoomCode, RoomError> {
        let mut rooms = self.rooms.lock().await;

        let code = (0..MAX_CODE_ATTEMPTS)
            .filter_map(|_| RoomCode::parse(&(self.generate_code)()).ok())
            .find(|code| !rooms.contains_key(code))
            .ok_or(RoomError::RoomCreationFailed {
                attempts: MAX_CODE_ATTEMPTS,
            })?;

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let (handle, actor) = new_room(code.clone(), video, self.config.clone(), generation);
        rooms.insert(code.clone(), handle);
        drop(rooms);

        let map = Arc::clone(&self.rooms);
        let room = code.clone();
        tokio::spawn(async move {
            actor.run().await;
            remove_if_current(&map, &room, generation).await;
        });

        tracing::info!(%code, "room created");
        Ok(code)
    }

    /// Returns the handle for `code`.
    pub async fn handle(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.rooms
            .lock()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))
    }

    /// Joins `user_id` to a room through `connection_id`.
    ///
    /// A user already in the room is re-bound to the new connection and
    /// never counts against capacity twice. The bootstrap snapshot is both
    /// returned and pushed into `sender`.
    pub async fn join_room(
        &self,
        code: &RoomCode,
        user_id: UserId,
        username: String,
        connection_id: ConnectionId,
        sender: ParticipantSender,
    ) -> Result<PartySnapshot, RoomError> {
        let handle = self.handle(code).await?;
        handle.join(user_id, username, connection_id, sender).await
    }

    /// Removes `user_id` from a room. If that emptied the room, the room is
    /// gone from the registry by the time this returns.
    pub async fn leave_room(&self, code: &RoomCode, user_id: UserId) -> Result<(), RoomError> {
        self.leave(code, user_id, None).await
    }

    /// Like [`Self::leave_room`], but only on behalf of the participant's
    /// live connection.
    pub async fn leave_room_from(
        &self,
        code: &RoomCode,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<(), RoomError> {
        self.leave(code, user_id, Some(connection_id)).await
    }

    async fn leave(
        &self,
        code: &RoomCode,
        user_id: UserId,
        connection_id: Option<ConnectionId>,
    ) -> Result<(), RoomError> {
        let handle = self.handle(code).await?;
        let closed = handle.leave(user_id, connection_id).await?;
        if closed {
            remove_if_current(&self.rooms, code, handle.generation()).await;
        }
        Ok(())
    }

    /// Returns a room's metadata.
    pub async fn get_room(&self, code: &RoomCode) -> Result<RoomSummary, RoomError> {
        let handle = self.handle(code).await?;
        handle.summary().await
    }

    /// Returns the number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Lists all active room codes.
    pub async fn room_codes(&self) -> Vec<RoomCode> {
        self.rooms.lock().await.keys().cloned().collect()
    }

    /// Stops every room and empties the registry.
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = {
            let mut rooms = self.rooms.lock().await;
            rooms.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            let _ = handle.shutdown().await;
        }
        tracing::info!(rooms = handles.len(), "registry shut down");
    }
}

/// Drops `code` from the map unless it already belongs to a newer room.
async fn remove_if_current(
    rooms: &Mutex<HashMap<RoomCode, RoomHandle>>,
    code: &RoomCode,
    generation: u64,
) {
    let mut rooms = rooms.lock().await;
    if rooms.get(code).is_some_and(|h| h.generation() == generation) {
        rooms.remove(code);
        tracing::info!(%code, "room destroyed");
    }
}

/// Draws a uniformly random code from [`RoomCode::ALPHABET`].
pub fn random_code() -> String {
    let mut rng = rand::rng();
    (0..RoomCode::LEN)
        .map(|_| char::from(RoomCode::ALPHABET[rng.random_range(0..RoomCode::ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_code_has_expected_shape() {
        for _ in 0..100 {
            let raw = random_code();
            let code = RoomCode::parse(&raw).unwrap();
            assert_eq!(code.as_str(), raw, "generated codes are already normalized");
        }
    }

    #[tokio::test]
    async fn test_create_room_fails_when_code_space_is_exhausted() {
        let registry = RoomRegistry::new(RoomConfig::default())
            .with_code_generator(Arc::new(|| "SAME01".to_string()));

        let first = registry.create_room(VideoRef::new("v1", "Movie")).await.unwrap();
        assert_eq!(first.as_str(), "SAME01");

        let second = registry.create_room(VideoRef::new("v2", "Other")).await;
        assert!(matches!(
            second,
            Err(RoomError::RoomCreationFailed { attempts: MAX_CODE_ATTEMPTS })
        ));
        assert_eq!(registry.room_count().await, 1);
    }
}
