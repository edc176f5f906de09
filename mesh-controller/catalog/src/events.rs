use mesh_controller_core::AnnouncementKind;
use tokio::sync::broadcast;

/// Identifies what a [`ReconcileEvent`] asks its consumers to do.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventTopic {
    /// Configuration must be recomputed and pushed to every proxy.
    ProxyBroadcast,
}

/// Signals that mesh state changed.
///
/// The event does not describe the change; `source` only records which kind
/// of collaborator observed it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReconcileEvent {
    pub topic: EventTopic,
    pub source: AnnouncementKind,
}

/// Publishes [`ReconcileEvent`]s to all subscribers.
///
/// A single bus is constructed at startup and handed to every publisher and
/// subscriber; clones share the same channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ReconcileEvent>,
}

// === impl ReconcileEvent ===

impl ReconcileEvent {
    pub fn proxy_broadcast(source: AnnouncementKind) -> Self {
        Self {
            topic: EventTopic::ProxyBroadcast,
            source,
        }
    }
}

// === impl EventBus ===

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event, returning the number of subscribers it was
    /// delivered to. Publishing without subscribers is not an error.
    pub fn publish(&self, event: ReconcileEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
