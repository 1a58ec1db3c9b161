//! Connection lifecycle notifications.
//!
//! Observers register by subscribing to a broadcast channel owned by the
//! emitting component; "connected" and "disconnected" are messages on that
//! channel, not method overrides. Delivery is best-effort: emitting with no
//! live subscriber is not an error.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::endpoint::EndpointId;

/// Buffered events per subscriber before lagging kicks in.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A connection lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Endpoint finished its handshake (or was accepted in plaintext mode)
    /// and is registered.
    Connected {
        endpoint: EndpointId,
        session_id: Option<Uuid>,
    },
    /// The endpoint closed, either locally or because a frame operation
    /// observed the peer's closure. Fires at most once per endpoint.
    Disconnected {
        endpoint: EndpointId,
        session_id: Option<Uuid>,
    },
}

/// Handle to the lifecycle event channel.
///
/// Cheap to clone; every endpoint created by a listener carries a clone so
/// it can announce its own disconnect.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Register an observer.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let events = SessionEvents::new();
        events.emit(SessionEvent::Connected {
            endpoint: 1,
            session_id: None,
        });
    }

    #[tokio::test]
    async fn test_all_subscribers_see_events() {
        let events = SessionEvents::new();
        let mut a = events.subscribe();
        let mut b = events.subscribe();

        let event = SessionEvent::Disconnected {
            endpoint: 7,
            session_id: None,
        };
        events.emit(event);

        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }
}
