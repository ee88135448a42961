//! # rabbitdesk-core
//!
//! Types shared by every RabbitDesk crate:
//!
//! - [`error`] - the client error taxonomy surfaced to callers
//! - [`clock`] - wall-clock abstraction used for credential expiry math
//! - [`events`] - client events, the broadcaster and listener registries

pub mod clock;
pub mod error;
pub mod events;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{ClientError, ErrorCategory, Result};
pub use events::{
    ClientEvent, EventBroadcaster, ExpiryReason, ListenerHandle, ListenerRegistry,
};
