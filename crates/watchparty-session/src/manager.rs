//! The reconnection manager: live connections and grace timers.
//!
//! One manager belongs to one room actor. It never touches the room's
//! participant list itself; it only answers "is this user live, and on
//! which connection?" and tells the room, through the `on_expire` future
//! handed to [`ReconnectionManager::detach`], when a grace window ran out.
//!
//! # Concurrency note
//!
//! `ReconnectionManager` is a plain struct with a plain `HashMap`. It is
//! owned by the room actor task, so every call is already serialized.
//!
//! # Lifecycle
//!
//! ```text
//!   attach() ──→ [Connected] ──detach()──→ [Disconnected] ──timer──→ expire()
//!                    ↑                           │
//!                    └────────attach()───────────┘  (timer cancelled)
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;
use watchparty_protocol::UserId;
use watchparty_transport::ConnectionId;

use crate::SessionError;

/// Configuration for server-side reconnection behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a participant whose connection dropped stays in the room
    /// before it is removed as if it had left.
    ///
    /// Default: 30 seconds.
    pub reconnect_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
        }
    }
}

/// Where a tracked participant currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// Live on `connection_id`.
    Connected { connection_id: ConnectionId },

    /// Lost its connection at `since`. The grace timer tagged with `epoch`
    /// is running; only that timer may expire this participant.
    Disconnected { since: Instant, epoch: u64 },
}

/// What [`ReconnectionManager::attach`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    /// First time this user is seen.
    Fresh,
    /// The user was inside its grace window; the timer was cancelled.
    Reconnected,
    /// The user was live on another connection (e.g. a second tab or a
    /// reconnect that beat the close of the old socket). The old connection
    /// is no longer the user's.
    Replaced { previous: ConnectionId },
    /// Same connection attached twice.
    Unchanged,
}

struct Tracked {
    presence: Presence,
    timer: Option<AbortHandle>,
}

impl Tracked {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Tracks live connections and grace timers for one room.
pub struct ReconnectionManager {
    tracked: HashMap<UserId, Tracked>,
    config: SessionConfig,
    /// Monotonic tag for grace timers, so a timer that lost the race with a
    /// reconnect can be told apart from the current one.
    next_epoch: u64,
}

impl ReconnectionManager {
    /// Creates an empty manager.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            tracked: HashMap::new(),
            config,
            next_epoch: 1,
        }
    }

    /// The configured grace window.
    pub fn grace(&self) -> Duration {
        self.config.reconnect_grace
    }

    /// Binds `user_id` to `connection_id`, cancelling any running grace
    /// timer.
    pub fn attach(&mut self, user_id: &UserId, connection_id: ConnectionId) -> Attach {
        let Some(tracked) = self.tracked.get_mut(user_id) else {
            self.tracked.insert(
                user_id.clone(),
                Tracked {
                    presence: Presence::Connected { connection_id },
                    timer: None,
                },
            );
            return Attach::Fresh;
        };

        let outcome = match tracked.presence {
            Presence::Disconnected { .. } => {
                tracked.cancel_timer();
                tracing::info!(%user_id, %connection_id, "participant reconnected within grace");
                Attach::Reconnected
            }
            Presence::Connected { connection_id: previous } if previous == connection_id => {
                Attach::Unchanged
            }
            Presence::Connected { connection_id: previous } => {
                tracing::debug!(%user_id, %previous, %connection_id, "connection replaced");
                Attach::Replaced { previous }
            }
        };
        tracked.presence = Presence::Connected { connection_id };
        outcome
    }

    /// Marks `user_id` as disconnected and starts its grace timer.
    ///
    /// `on_expire` receives the timer's epoch and produces the future to
    /// run once the grace window has elapsed; typically it sends a message
    /// back into the room actor, which then calls [`Self::expire`] with the
    /// same epoch. Returns that epoch.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if the user is not tracked.
    /// - [`SessionError::StaleConnection`] if `connection_id` is not the
    ///   user's live connection. A replaced socket closing late must not
    ///   start a timer for a participant that is happily connected
    ///   elsewhere.
    pub fn detach<F, Fut>(
        &mut self,
        user_id: &UserId,
        connection_id: ConnectionId,
        on_expire: F,
    ) -> Result<u64, SessionError>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let grace = self.config.reconnect_grace;
        let tracked = self
            .tracked
            .get_mut(user_id)
            .ok_or_else(|| SessionError::NotFound(user_id.clone()))?;

        match tracked.presence {
            Presence::Connected { connection_id: live } if live == connection_id => {}
            _ => {
                return Err(SessionError::StaleConnection {
                    user_id: user_id.clone(),
                    connection_id,
                });
            }
        }

        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let fire = on_expire(epoch);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            fire.await;
        });

        tracked.presence = Presence::Disconnected {
            since: Instant::now(),
            epoch,
        };
        tracked.timer = Some(timer.abort_handle());

        tracing::info!(
            %user_id,
            %connection_id,
            grace_secs = grace.as_secs_f64(),
            "participant disconnected, grace period started"
        );
        Ok(epoch)
    }

    /// Consumes a fired grace timer.
    ///
    /// Returns `true` and forgets the user if it is still disconnected
    /// under `epoch`. Returns `false` for anything else (the user came
    /// back, left explicitly, or a newer timer is running).
    pub fn expire(&mut self, user_id: &UserId, epoch: u64) -> bool {
        let current = matches!(
            self.tracked.get(user_id),
            Some(Tracked { presence: Presence::Disconnected { epoch: e, .. }, .. }) if *e == epoch
        );
        if current {
            self.tracked.remove(user_id);
            tracing::info!(%user_id, "grace period elapsed");
        }
        current
    }

    /// Stops tracking `user_id` (explicit leave), cancelling any timer.
    pub fn remove(&mut self, user_id: &UserId) {
        if let Some(mut tracked) = self.tracked.remove(user_id) {
            tracked.cancel_timer();
        }
    }

    /// Returns the user's presence, if tracked.
    pub fn presence(&self, user_id: &UserId) -> Option<&Presence> {
        self.tracked.get(user_id).map(|t| &t.presence)
    }

    /// `true` if the user is live on some connection.
    pub fn is_connected(&self, user_id: &UserId) -> bool {
        matches!(self.presence(user_id), Some(Presence::Connected { .. }))
    }

    /// The user's live connection, if any.
    pub fn connection(&self, user_id: &UserId) -> Option<ConnectionId> {
        match self.presence(user_id) {
            Some(Presence::Connected { connection_id }) => Some(*connection_id),
            _ => None,
        }
    }

    /// Number of tracked users currently inside a grace window.
    pub fn disconnected_count(&self) -> usize {
        self.tracked
            .values()
            .filter(|t| matches!(t.presence, Presence::Disconnected { .. }))
            .count()
    }
}

impl Drop for ReconnectionManager {
    fn drop(&mut self) {
        for tracked in self.tracked.values_mut() {
            tracked.cancel_timer();
        }
    }
}
