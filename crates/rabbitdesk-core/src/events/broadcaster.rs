//! Event broadcaster for client events.
//!
//! The `EventBroadcaster` is the bus the credential monitor and availability
//! probe publish on. It uses tokio's broadcast channel so any number of UI
//! components can subscribe.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::types::ClientEvent;

/// Default buffer size for the broadcast channel.
/// Slow receivers lose the oldest events beyond this limit.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// Broadcaster for client events.
///
/// Cheap to clone; all clones publish to the same subscribers.
///
/// # Example
///
/// ```
/// use rabbitdesk_core::events::{ClientEvent, EventBroadcaster};
///
/// let broadcaster = EventBroadcaster::new();
/// let mut receiver = broadcaster.subscribe();
///
/// broadcaster.send(ClientEvent::TargetRecovered {
///     target: "cluster-1".to_string(),
///     response_time_ms: Some(12),
/// });
///
/// assert!(receiver.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new broadcaster wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn send(&self, event: ClientEvent) -> usize {
        tracing::trace!(event = event.name(), "Publishing client event");
        self.sender.send(event).unwrap_or_default()
    }

    /// Subscribe to events.
    ///
    /// Events sent before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers.
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ExpiryReason;

    #[test]
    fn test_broadcaster_no_subscribers() {
        let broadcaster = EventBroadcaster::new();
        assert!(!broadcaster.has_subscribers());
        let count = broadcaster.send(ClientEvent::CredentialRefreshed { expires_at: None });
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_broadcaster_multiple_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let mut receiver1 = broadcaster.subscribe();
        let mut receiver2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        let count = broadcaster.send(ClientEvent::CredentialExpired {
            reason: ExpiryReason::Expired,
            return_to: None,
        });
        assert_eq!(count, 2);

        let event1 = receiver1.recv().await.unwrap();
        let event2 = receiver2.recv().await.unwrap();
        assert_eq!(event1, event2);
        assert_eq!(event1.name(), "credential_expired");
    }

    #[tokio::test]
    async fn test_broadcaster_clone_shares_channel() {
        let broadcaster = EventBroadcaster::new();
        let clone = broadcaster.clone();
        let mut receiver = broadcaster.subscribe();

        clone.send(ClientEvent::TargetUnavailable {
            target: "cluster-2".to_string(),
            error: "timeout".to_string(),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.target(), Some("cluster-2"));
    }
}
