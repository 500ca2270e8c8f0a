//! # Watch Party
//!
//! Synchronized co-viewing server. Viewers in a room share one playback
//! timeline controlled by a host, plus one chat timeline. The host role
//! migrates automatically when the host leaves, and dropped viewers keep
//! their seat for a grace period.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use watchparty::prelude::*;
//!
//! # async fn run() -> Result<(), WatchPartyError> {
//! let server = WatchPartyServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .http_bind("0.0.0.0:8081")
//!     .room_config(RoomConfig { max_participants: 10, ..RoomConfig::default() })
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
pub mod http;
mod server;

pub use error::WatchPartyError;
pub use handler::ConnectionConfig;
pub use server::{WatchPartyServer, WatchPartyServerBuilder};

pub mod prelude {
    pub use crate::http::{ApiError, ErrorResponse};
    pub use crate::{ConnectionConfig, WatchPartyError, WatchPartyServer, WatchPartyServerBuilder};
    pub use watchparty_protocol::{
        ChatMessage, ClientMessage, Codec, ErrorCode, JsonCodec, ParticipantInfo, PartySnapshot,
        RoomCode, RosterUpdate, ServerMessage, UserId, VideoRef,
    };
    pub use watchparty_room::{RoomConfig, RoomError, RoomRegistry, RoomSummary};
    pub use watchparty_session::SessionConfig;
}
