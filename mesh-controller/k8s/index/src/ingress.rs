use crate::{namespaced_name, SizedIndex};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use mesh_controller_core::{Announcement, AnnouncementStream, Announcer, IngressMonitor, ObjectRef};
use mesh_controller_k8s_api::Ingress;
use parking_lot::RwLock;
use std::sync::Arc;

/// Tracks which `Ingress` resources exist. Their rules are not interpreted;
/// every applied change is announced.
#[derive(Debug, Default)]
pub struct IngressIndex {
    by_ns: HashMap<String, HashSet<String>>,
    announcer: Announcer,
}

pub type SharedIngressIndex = Arc<RwLock<IngressIndex>>;

/// Serves ingress notifications from an [`IngressIndex`].
#[derive(Clone, Debug)]
pub struct Ingresses(SharedIngressIndex);

// === impl IngressIndex ===

impl IngressIndex {
    pub fn shared() -> SharedIngressIndex {
        Arc::new(RwLock::new(Self::default()))
    }
}

impl kubert::index::IndexNamespacedResource<Ingress> for IngressIndex {
    fn apply(&mut self, ingress: Ingress) {
        let (ns, name) = namespaced_name(&ingress);
        let reference = ObjectRef::new(&ns, &name);
        self.by_ns.entry(ns).or_default().insert(name);
        tracing::debug!(ingress = %reference, "Indexed ingress");
        self.announcer
            .announce(Announcement::IngressUpdated(reference));
    }

    fn delete(&mut self, namespace: String, name: String) {
        let Some(names) = self.by_ns.get_mut(&namespace) else {
            return;
        };
        if !names.remove(&name) {
            return;
        }
        if names.is_empty() {
            self.by_ns.remove(&namespace);
        }
        self.announcer
            .announce(Announcement::IngressDeleted(ObjectRef::new(namespace, name)));
    }
}

impl SizedIndex<Ingress> for IngressIndex {
    fn size(&self, namespace: &str) -> usize {
        self.by_ns.get(namespace).map_or(0, |s| s.len())
    }
}

// === impl Ingresses ===

impl Ingresses {
    pub fn new(index: SharedIngressIndex) -> Self {
        Self(index)
    }
}

impl IngressMonitor for Ingresses {
    fn announcements(&self) -> AnnouncementStream {
        self.0.read().announcer.subscribe()
    }
}
