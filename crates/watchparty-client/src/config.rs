//! Client capabilities and connection settings.

use std::time::Duration;

use watchparty_session::ReconnectPolicy;

/// Settings for a [`crate::WatchPartyClient`].
///
/// ```rust
/// use std::time::Duration;
/// use watchparty_client::ClientConfig;
///
/// let config = ClientConfig::new("ws://127.0.0.1:8080")
///     .enable_reactions(false)
///     .heartbeat_interval(Duration::from_secs(10));
/// assert!(!config.enable_reactions);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub url: String,
    /// Whether this client may send reactions. Default: true.
    pub enable_reactions: bool,
    /// How to redial after losing the connection.
    pub reconnect: ReconnectPolicy,
    /// How often to send `heartbeat` while connected. Should sit well
    /// under the server's idle timeout, if it runs one. Default: 20 seconds.
    pub heartbeat_interval: Duration,
    /// How many chat messages the local view keeps. Older ones are
    /// dropped as new ones arrive. Default: 500.
    pub chat_history: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            enable_reactions: true,
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: Duration::from_secs(20),
            chat_history: 500,
        }
    }

    pub fn enable_reactions(mut self, enabled: bool) -> Self {
        self.enable_reactions = enabled;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn chat_history(mut self, messages: usize) -> Self {
        self.chat_history = messages;
        self
    }
}
