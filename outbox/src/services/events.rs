use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{EmailTracking, FollowUp};

/// State changes other parts of the client may react to
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Reminders that are due as of the latest check, oldest first
    FollowUpsDue { records: Vec<FollowUp> },
    ScheduledSent { id: String },
    ScheduledFailed { id: String, error: String },
    OfflineDrained { success: Vec<String>, failed: Vec<String> },
    TrackingUpdated { record: EmailTracking },
}

/// Fan-out of domain events to any number of subscribers
///
/// Publishing never fails; events are dropped when nobody listens.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: DomainEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
