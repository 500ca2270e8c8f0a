//! Participant presence and reconnection for watch parties.
//!
//! Two halves of the same concern live here:
//!
//! 1. **Server side**: [`ReconnectionManager`] tracks which connection each
//!    participant is live on, and runs a per-participant grace timer when
//!    that connection drops. The participant stays in the room until the
//!    timer fires; reconnecting with the same user id cancels it.
//! 2. **Client side**: [`ReconnectPolicy`] / [`Backoff`] compute capped
//!    exponential delays with jitter between redial attempts.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← owns one ReconnectionManager per room actor
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol / Transport (below)  ← UserId, ConnectionId
//! ```

mod backoff;
mod error;
mod manager;

pub use backoff::{Backoff, ReconnectPolicy};
pub use error::SessionError;
pub use manager::{Attach, Presence, ReconnectionManager, SessionConfig};
