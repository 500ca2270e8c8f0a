//! Server settings read from `WATCHPARTY_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use watchparty::prelude::RoomConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// `WATCHPARTY_WS_ADDR`, default `0.0.0.0:8080`.
    pub ws_addr: String,
    /// `WATCHPARTY_HTTP_ADDR`, default `0.0.0.0:8081`.
    pub http_addr: String,
    pub room: RoomConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = RoomConfig::default();
        let grace_secs = parse_or(&get, "WATCHPARTY_GRACE_SECS", defaults.reconnect_grace.as_secs())?;

        Ok(Self {
            ws_addr: get("WATCHPARTY_WS_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            http_addr: get("WATCHPARTY_HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:8081".to_string()),
            room: RoomConfig {
                max_participants: parse_or(
                    &get,
                    "WATCHPARTY_MAX_PARTICIPANTS",
                    defaults.max_participants,
                )?,
                chat_retention: parse_or(&get, "WATCHPARTY_CHAT_RETENTION", defaults.chat_retention)?,
                reconnect_grace: Duration::from_secs(grace_secs),
                ..defaults
            },
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key} value {raw:?}")),
        None => Ok(default),
    }
}
