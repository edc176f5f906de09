use crate::{mesh_service, namespaced_name, SizedIndex};
use ahash::AHashMap as HashMap;
use mesh_controller_core::{
    Announcement, AnnouncementStream, Announcer, EndpointError, EndpointProvider, MeshService,
    ServiceEndpoint,
};
use mesh_controller_k8s_api::{EndpointSlice, ResourceExt};
use parking_lot::RwLock;
use std::{net::IpAddr, sync::Arc};

/// Associates an `EndpointSlice` with the service it belongs to.
const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Indexes the ready endpoints of each service from its `EndpointSlice`s.
#[derive(Debug, Default)]
pub struct EndpointIndex {
    by_ns: HashMap<String, HashMap<String, Slice>>,
    announcer: Announcer,
}

pub type SharedEndpointIndex = Arc<RwLock<EndpointIndex>>;

/// Serves endpoints from an [`EndpointIndex`].
#[derive(Clone, Debug)]
pub struct KubernetesEndpoints(SharedEndpointIndex);

#[derive(Debug, PartialEq)]
struct Slice {
    service: MeshService,
    endpoints: Vec<ServiceEndpoint>,
}

// === impl EndpointIndex ===

impl EndpointIndex {
    pub fn shared() -> SharedEndpointIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    fn endpoints(&self, service: &MeshService) -> Option<Vec<ServiceEndpoint>> {
        let slices = self.by_ns.get(service.namespace())?;
        let mut found = false;
        let mut endpoints = Vec::new();
        for slice in slices.values().filter(|s| s.service == *service) {
            found = true;
            endpoints.extend(slice.endpoints.iter().copied());
        }
        if !found {
            return None;
        }
        endpoints.sort();
        endpoints.dedup();
        Some(endpoints)
    }
}

impl kubert::index::IndexNamespacedResource<EndpointSlice> for EndpointIndex {
    fn apply(&mut self, slice: EndpointSlice) {
        let (ns, name) = namespaced_name(&slice);
        let Some(service) = slice
            .labels()
            .get(SERVICE_NAME_LABEL)
            .and_then(|svc| mesh_service(&ns, svc))
        else {
            // A slice may lose its service label after it was indexed.
            tracing::debug!(namespace = %ns, %name, "Ignoring EndpointSlice without a service");
            self.remove(&ns, &name);
            return;
        };

        let slice = Slice {
            endpoints: ready_endpoints(&slice),
            service,
        };
        let slices = self.by_ns.entry(ns).or_default();
        if slices.get(&name) == Some(&slice) {
            return;
        }

        tracing::debug!(service = %slice.service, endpoints = slice.endpoints.len(), slice = %name, "Indexed endpoints");
        let service = slice.service.clone();
        if let Some(prior) = slices.insert(name, slice) {
            if prior.service != service {
                self.announce_change(prior.service);
            }
        }
        self.announce_change(service);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.remove(&namespace, &name);
    }
}

impl EndpointIndex {
    fn remove(&mut self, namespace: &str, name: &str) {
        let Some(slice) = self
            .by_ns
            .get_mut(namespace)
            .and_then(|slices| slices.remove(name))
        else {
            return;
        };
        if self.by_ns.get(namespace).is_some_and(|s| s.is_empty()) {
            self.by_ns.remove(namespace);
        }
        tracing::debug!(service = %slice.service, slice = %name, "Removed endpoints");
        self.announce_change(slice.service);
    }

    /// Announces the service's endpoints as updated while any slice still
    /// references it, and as deleted otherwise.
    fn announce_change(&self, service: MeshService) {
        let announcement = if self.endpoints(&service).is_some() {
            Announcement::EndpointsUpdated(service)
        } else {
            Announcement::EndpointsDeleted(service)
        };
        self.announcer.announce(announcement);
    }
}

impl SizedIndex<EndpointSlice> for EndpointIndex {
    fn size(&self, namespace: &str) -> usize {
        self.by_ns.get(namespace).map_or(0, |s| s.len())
    }
}

/// Lists every address/port pair of the slice's ready endpoints. An endpoint
/// without a readiness condition is considered ready.
fn ready_endpoints(slice: &EndpointSlice) -> Vec<ServiceEndpoint> {
    let ports = slice
        .ports
        .iter()
        .flatten()
        .filter_map(|p| p.port)
        .filter_map(|p| u16::try_from(p).ok())
        .collect::<Vec<_>>();

    let mut endpoints = Vec::new();
    for ep in &slice.endpoints {
        let ready = ep
            .conditions
            .as_ref()
            .and_then(|c| c.ready)
            .unwrap_or(true);
        if !ready {
            continue;
        }
        for addr in &ep.addresses {
            let ip = match addr.parse::<IpAddr>() {
                Ok(ip) => ip,
                Err(error) => {
                    tracing::warn!(%error, address = %addr, "Ignoring invalid endpoint address");
                    continue;
                }
            };
            endpoints.extend(ports.iter().map(|&port| ServiceEndpoint::new(ip, port)));
        }
    }
    endpoints
}

// === impl KubernetesEndpoints ===

impl KubernetesEndpoints {
    pub const ID: &'static str = "kubernetes";

    pub fn new(index: SharedEndpointIndex) -> Self {
        Self(index)
    }
}

impl EndpointProvider for KubernetesEndpoints {
    fn id(&self) -> &str {
        Self::ID
    }

    fn announcements(&self) -> AnnouncementStream {
        self.0.read().announcer.subscribe()
    }

    fn list_endpoints(&self, service: &MeshService) -> Result<Vec<ServiceEndpoint>, EndpointError> {
        self.0
            .read()
            .endpoints(service)
            .ok_or_else(|| EndpointError::NotFound(service.clone()))
    }
}
