//! Room lifecycle management for watch parties.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! participant list, host, playback timeline, chat log, and reconnection
//! timers.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms, maps codes to running actors
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`Playback`]: the host-authoritative playback state machine
//! - [`ChatLog`]: the bounded, totally ordered chat timeline
//! - [`RoomConfig`]: capacity, retention, grace period, seek tolerance

mod chat;
mod config;
mod error;
mod playback;
mod registry;
mod room;

pub use chat::ChatLog;
pub use config::RoomConfig;
pub use error::RoomError;
pub use playback::{Playback, PlaybackState};
pub use registry::{CodeGenerator, MAX_CODE_ATTEMPTS, RoomRegistry, random_code};
pub use room::{HostAction, ParticipantSender, RoomHandle, RoomSummary};
