//! Watch-party client controller.
//!
//! One controller serves every kind of viewer; what differs between them
//! (reactions on or off, how hard to try reconnecting) lives in
//! [`ClientConfig`].
//!
//! ```rust,no_run
//! use watchparty_client::{ClientConfig, ClientEvent, WatchPartyClient};
//! use watchparty_protocol::{RoomCode, UserId};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WatchPartyClient::new(ClientConfig::new("ws://127.0.0.1:8080"));
//! let mut party = client
//!     .join(RoomCode::parse("AB12CD")?, UserId::new("u1"), "Alice")
//!     .await?;
//!
//! party.send_message("hi all").await?;
//! while let Some(event) = party.next_event().await {
//!     if event == ClientEvent::ConnectionLost {
//!         break;
//!     }
//! }
//! party.leave().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod view;

pub use client::{ClientEvent, PartyHandle, WatchPartyClient};
pub use config::ClientConfig;
pub use error::ClientError;
pub use view::PartyView;
