//! Engine event stream for real-time UI notification.
//!
//! Broadcast-based: every subscriber gets every event, slow subscribers lag
//! rather than block the engine.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Conflict, ConflictId, DiscardReason, EditSession, Resolution};

/// Why an edit session left the presence table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCloseReason {
    /// Closed by the user or host application
    Explicit,
    /// Expired after the inactivity timeout
    Expired,
}

/// Events emitted by the engine as conflicts move through their lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A conflict was created or gained an intent
    ConflictDetected { conflict: Conflict },
    /// A resolution was applied and committed
    ConflictResolved {
        conflict_id: ConflictId,
        resolution: Resolution,
    },
    /// A conflict left the active set without a resolution
    ConflictDiscarded {
        conflict_id: ConflictId,
        reason: DiscardReason,
    },
    /// An edit session closed or expired
    SessionClosed {
        session: EditSession,
        reason: SessionCloseReason,
    },
    /// A resolved value could not be committed after the automatic retry
    ApplyFailed {
        conflict_id: ConflictId,
        detail: String,
    },
}

/// Fan-out channel for engine events.
#[derive(Debug)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; a send error only means nobody is listening.
    pub(crate) fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordKey, UserRef};
    use chrono::Utc;

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(8);
        bus.publish(EngineEvent::SessionClosed {
            session: EditSession::new(
                UserRef::new("u1", "Alice"),
                RecordKey::new("products", "42"),
                Utc::now(),
            ),
            reason: SessionCloseReason::Explicit,
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(EngineEvent::SessionClosed {
            session: EditSession::new(
                UserRef::new("u1", "Alice"),
                RecordKey::new("products", "42"),
                Utc::now(),
            ),
            reason: SessionCloseReason::Expired,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            EngineEvent::SessionClosed {
                reason: SessionCloseReason::Expired,
                ..
            }
        ));
    }
}
