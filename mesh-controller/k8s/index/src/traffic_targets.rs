use crate::{mesh_service, namespaced_name, SizedIndex};
use ahash::AHashMap as HashMap;
use mesh_controller_core::{
    Announcement, AnnouncementStream, Announcer, MeshSpec, ObjectRef, TrafficTarget,
};
use mesh_controller_k8s_api::{access::IdentityBindingSubject, TrafficTarget as TrafficTargetResource};
use parking_lot::RwLock;
use std::sync::Arc;

/// Indexes SMI `TrafficTarget`s, each expanded into one grant per source.
#[derive(Debug, Default)]
pub struct TrafficTargetIndex {
    by_ns: HashMap<String, HashMap<String, Vec<TrafficTarget>>>,
    announcer: Announcer,
}

pub type SharedTrafficTargetIndex = Arc<RwLock<TrafficTargetIndex>>;

/// Serves traffic policy from a [`TrafficTargetIndex`].
#[derive(Clone, Debug)]
pub struct TrafficTargets(SharedTrafficTargetIndex);

// === impl TrafficTargetIndex ===

impl TrafficTargetIndex {
    pub fn shared() -> SharedTrafficTargetIndex {
        Arc::new(RwLock::new(Self::default()))
    }
}

impl kubert::index::IndexNamespacedResource<TrafficTargetResource> for TrafficTargetIndex {
    fn apply(&mut self, tt: TrafficTargetResource) {
        let (ns, name) = namespaced_name(&tt);
        let reference = ObjectRef::new(&ns, &name);
        let targets = expand(&reference, &tt);

        let by_name = self.by_ns.entry(ns).or_default();
        if by_name.get(&name) == Some(&targets) {
            return;
        }
        tracing::debug!(traffic_target = %reference, grants = targets.len(), "Indexed traffic target");
        by_name.insert(name, targets);
        self.announcer
            .announce(Announcement::TrafficTargetUpdated(reference));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let Some(by_name) = self.by_ns.get_mut(&namespace) else {
            return;
        };
        if by_name.remove(&name).is_none() {
            return;
        }
        if by_name.is_empty() {
            self.by_ns.remove(&namespace);
        }

        let reference = ObjectRef::new(namespace, name);
        tracing::debug!(traffic_target = %reference, "Removed traffic target");
        self.announcer
            .announce(Announcement::TrafficTargetDeleted(reference));
    }
}

impl SizedIndex<TrafficTargetResource> for TrafficTargetIndex {
    fn size(&self, namespace: &str) -> usize {
        self.by_ns.get(namespace).map_or(0, |s| s.len())
    }
}

/// Only service account subjects are supported.
const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";

/// Subjects without a namespace refer to the traffic target's namespace.
/// Subjects of another kind, or that cannot name a service, are skipped.
fn expand(reference: &ObjectRef, tt: &TrafficTargetResource) -> Vec<TrafficTarget> {
    let subject = |s: &IdentityBindingSubject| {
        if s.kind != SERVICE_ACCOUNT_KIND {
            tracing::warn!(traffic_target = %reference, kind = %s.kind, name = %s.name, "Ignoring unsupported subject kind");
            return None;
        }
        let ns = s.namespace.as_deref().unwrap_or(&reference.namespace);
        mesh_service(ns, &s.name)
    };

    let Some(destination) = subject(&tt.spec.destination) else {
        return Vec::new();
    };
    let mut targets = tt
        .spec
        .sources
        .iter()
        .filter_map(subject)
        .map(|source| TrafficTarget {
            reference: reference.clone(),
            source,
            destination: destination.clone(),
        })
        .collect::<Vec<_>>();
    targets.sort();
    targets.dedup();
    targets
}

// === impl TrafficTargets ===

impl TrafficTargets {
    pub fn new(index: SharedTrafficTargetIndex) -> Self {
        Self(index)
    }
}

impl MeshSpec for TrafficTargets {
    fn announcements(&self) -> AnnouncementStream {
        self.0.read().announcer.subscribe()
    }

    fn list_traffic_targets(&self) -> Vec<TrafficTarget> {
        let index = self.0.read();
        let mut targets = index
            .by_ns
            .values()
            .flat_map(|by_name| by_name.values())
            .flatten()
            .cloned()
            .collect::<Vec<_>>();
        targets.sort();
        targets
    }
}
