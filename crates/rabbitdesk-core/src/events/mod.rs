//! Client event system.
//!
//! Two delivery mechanisms, for two kinds of consumers:
//!
//! ```text
//!  CredentialMonitor ──status──▶ ListenerRegistry ──▶ Fn(&CredentialStatus) ...
//!         │
//!         └──────────events────┐
//!  AvailabilityProbe ──events──┴▶ EventBroadcaster ──▶ broadcast::Receiver ...
//! ```
//!
//! - [`listeners`]: synchronous observers with unsubscribe handles, notified
//!   on every poll tick
//! - [`broadcaster`]: tokio broadcast bus for discrete lifecycle events
//! - [`types`]: `ClientEvent` and `ExpiryReason`

pub mod broadcaster;
pub mod listeners;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use listeners::{ListenerHandle, ListenerRegistry};
pub use types::{ClientEvent, ExpiryReason};
