use crate::{mesh_service, namespaced_name, SizedIndex};
use ahash::AHashMap as HashMap;
use mesh_controller_core::{
    Announcement, AnnouncementStream, Announcer, MeshService, MeshTopology,
};
use mesh_controller_k8s_api::Service;
use parking_lot::RwLock;
use std::{collections::BTreeSet, sync::Arc};

/// Indexes the services known to the mesh, by namespace.
#[derive(Debug, Default)]
pub struct ServiceIndex {
    by_ns: HashMap<String, BTreeSet<MeshService>>,
    announcer: Announcer,
}

pub type SharedServiceIndex = Arc<RwLock<ServiceIndex>>;

/// Serves the mesh topology from a [`ServiceIndex`].
#[derive(Clone, Debug)]
pub struct Topology(SharedServiceIndex);

// === impl ServiceIndex ===

impl ServiceIndex {
    pub fn shared() -> SharedServiceIndex {
        Arc::new(RwLock::new(Self::default()))
    }
}

impl kubert::index::IndexNamespacedResource<Service> for ServiceIndex {
    fn apply(&mut self, service: Service) {
        let (ns, name) = namespaced_name(&service);
        let Some(svc) = mesh_service(&ns, &name) else {
            return;
        };

        if self.by_ns.entry(ns).or_default().insert(svc.clone()) {
            tracing::debug!(service = %svc, "Indexed service");
            self.announcer.announce(Announcement::ServiceUpdated(svc));
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let Some(services) = self.by_ns.get_mut(&namespace) else {
            return;
        };
        let Some(svc) = services.iter().find(|s| s.name() == name).cloned() else {
            return;
        };

        services.remove(&svc);
        if services.is_empty() {
            self.by_ns.remove(&namespace);
        }
        tracing::debug!(service = %svc, "Removed service");
        self.announcer.announce(Announcement::ServiceDeleted(svc));
    }
}

impl SizedIndex<Service> for ServiceIndex {
    fn size(&self, namespace: &str) -> usize {
        self.by_ns.get(namespace).map_or(0, BTreeSet::len)
    }
}

// === impl Topology ===

impl Topology {
    pub fn new(index: SharedServiceIndex) -> Self {
        Self(index)
    }
}

impl MeshTopology for Topology {
    fn announcements(&self) -> AnnouncementStream {
        self.0.read().announcer.subscribe()
    }

    fn list_services(&self) -> Vec<MeshService> {
        let index = self.0.read();
        let mut services = index.by_ns.values().flatten().cloned().collect::<Vec<_>>();
        services.sort();
        services
    }
}
