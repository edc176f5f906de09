use crate::{AnnouncementStream, MeshService, ObjectRef};

/// Serves traffic access policy.
pub trait MeshSpec: Send + Sync {
    fn announcements(&self) -> AnnouncementStream;

    fn list_traffic_targets(&self) -> Vec<TrafficTarget>;
}

/// Allows `source` to send traffic to `destination`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrafficTarget {
    /// The policy resource that granted this access.
    pub reference: ObjectRef,
    pub source: MeshService,
    pub destination: MeshService,
}
