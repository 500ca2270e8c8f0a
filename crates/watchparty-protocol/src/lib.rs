//! Wire protocol for watch parties.
//!
//! This crate defines the language viewers and the server speak:
//!
//! - **Types** ([`UserId`], [`RoomCode`], [`ChatMessage`], ...): identities
//!   and the data carried inside messages.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): the tagged frames
//!   that travel over the persistent channel.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about connections or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Room (state machine)
//! ```

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{ClientMessage, PartySnapshot, RosterUpdate, ServerMessage};
pub use types::{
    ChatMessage, ErrorCode, ParticipantInfo, RoomCode, SYSTEM_SENDER_ID, SYSTEM_SENDER_NAME,
    UserId, VideoRef,
};
