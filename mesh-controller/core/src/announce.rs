use crate::MeshService;
use futures::prelude::*;
use parking_lot::Mutex;
use std::{fmt, pin::Pin};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A stream of change notifications published by a single collaborator.
pub type AnnouncementStream = Pin<Box<dyn Stream<Item = Announcement> + Send + 'static>>;

/// A change observed by a collaborator.
///
/// The payload is informational: consumers are only expected to learn that
/// *something* changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Announcement {
    ServiceUpdated(MeshService),
    ServiceDeleted(MeshService),
    EndpointsUpdated(MeshService),
    EndpointsDeleted(MeshService),
    TrafficTargetUpdated(ObjectRef),
    TrafficTargetDeleted(ObjectRef),
    CertificateRotated(String),
    IngressUpdated(ObjectRef),
    IngressDeleted(ObjectRef),
    Tick,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnnouncementKind {
    Topology,
    Policy,
    Certificate,
    Ingress,
    Endpoints,
    Timer,
}

/// Names a namespaced resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

/// Fans announcements out to any number of subscribers.
///
/// Each subscriber gets its own unbounded queue so that a slow consumer never
/// causes another to miss a notification. Subscribers whose stream has been
/// dropped are pruned on the next announcement.
#[derive(Debug, Default)]
pub struct Announcer {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Announcement>>>,
}

// === impl Announcement ===

impl Announcement {
    pub fn kind(&self) -> AnnouncementKind {
        match self {
            Self::ServiceUpdated(_) | Self::ServiceDeleted(_) => AnnouncementKind::Topology,
            Self::EndpointsUpdated(_) | Self::EndpointsDeleted(_) => AnnouncementKind::Endpoints,
            Self::TrafficTargetUpdated(_) | Self::TrafficTargetDeleted(_) => {
                AnnouncementKind::Policy
            }
            Self::CertificateRotated(_) => AnnouncementKind::Certificate,
            Self::IngressUpdated(_) | Self::IngressDeleted(_) => AnnouncementKind::Ingress,
            Self::Tick => AnnouncementKind::Timer,
        }
    }
}

// === impl AnnouncementKind ===

impl AnnouncementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Topology => "topology",
            Self::Policy => "policy",
            Self::Certificate => "certificate",
            Self::Ingress => "ingress",
            Self::Endpoints => "endpoints",
            Self::Timer => "timer",
        }
    }
}

impl fmt::Display for AnnouncementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ObjectRef ===

impl ObjectRef {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl Announcer ===

impl Announcer {
    pub fn subscribe(&self) -> AnnouncementStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    pub fn announce(&self, announcement: Announcement) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(announcement.clone()).is_ok());
    }

    /// Ends all subscriber streams.
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }

    pub fn subscribers(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_observes_every_announcement() {
        let announcer = Announcer::default();
        let mut a = announcer.subscribe();
        let mut b = announcer.subscribe();

        announcer.announce(Announcement::Tick);
        announcer.announce(Announcement::CertificateRotated("bookstore".to_string()));

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.next().await, Some(Announcement::Tick));
            assert_eq!(
                rx.next().await,
                Some(Announcement::CertificateRotated("bookstore".to_string()))
            );
        }
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let announcer = Announcer::default();
        let rx = announcer.subscribe();
        let mut live = announcer.subscribe();
        assert_eq!(announcer.subscribers(), 2);

        drop(rx);
        announcer.announce(Announcement::Tick);
        assert_eq!(announcer.subscribers(), 1);
        assert_eq!(live.next().await, Some(Announcement::Tick));
    }

    #[tokio::test]
    async fn close_ends_streams() {
        let announcer = Announcer::default();
        let mut rx = announcer.subscribe();
        announcer.close();
        assert_eq!(rx.next().await, None);
    }
}
