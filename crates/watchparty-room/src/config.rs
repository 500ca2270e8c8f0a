//! Room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use watchparty_session::SessionConfig;

/// Configuration shared by every room a registry creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Maximum participants per room. Returning participants never count
    /// against this twice.
    pub max_participants: usize,

    /// How many chat lines a room keeps. Oldest lines are evicted first.
    pub chat_retention: usize,

    /// How many of the most recent chat lines a joiner receives.
    pub snapshot_history: usize,

    /// Longest accepted chat line, in characters, after trimming.
    pub max_message_chars: usize,

    /// Longest accepted reaction payload, in characters.
    pub max_emoji_chars: usize,

    /// Seeks closer than this to the extrapolated position are applied
    /// but not broadcast.
    pub seek_epsilon: Duration,

    /// How long a participant whose connection dropped keeps its seat.
    pub reconnect_grace: Duration,

    /// Capacity of each room actor's command channel.
    pub channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_participants: 20,
            chat_retention: 500,
            snapshot_history: 50,
            max_message_chars: 2000,
            max_emoji_chars: 16,
            seek_epsilon: Duration::from_secs(1),
            reconnect_grace: Duration::from_secs(30),
            channel_size: 64,
        }
    }
}

impl RoomConfig {
    /// The reconnection settings each room's presence tracker runs with.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reconnect_grace: self.reconnect_grace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.max_participants, 20);
        assert_eq!(config.chat_retention, 500);
        assert_eq!(config.snapshot_history, 50);
        assert_eq!(config.seek_epsilon, Duration::from_secs(1));
        assert_eq!(config.reconnect_grace, Duration::from_secs(30));
    }

    #[test]
    fn test_session_config_carries_grace() {
        let config = RoomConfig {
            reconnect_grace: Duration::from_secs(5),
            ..RoomConfig::default()
        };
        assert_eq!(config.session_config().reconnect_grace, Duration::from_secs(5));
    }
}
