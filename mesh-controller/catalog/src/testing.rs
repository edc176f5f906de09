//! In-memory collaborators for tests.

use crate::MeshCatalog;
use mesh_controller_core::{
    Announcement, AnnouncementStream, Announcer, CertManager, EndpointError, EndpointProvider,
    IngressMonitor, MeshConfig, MeshService, MeshSpec, MeshTopology, ObjectRef, SdsConfig,
    ServiceEndpoint, TrafficTarget,
};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

#[derive(Debug, Default)]
pub struct Topology {
    pub announcer: Announcer,
    services: RwLock<Vec<MeshService>>,
}

#[derive(Debug, Default)]
pub struct Spec {
    pub announcer: Announcer,
    targets: RwLock<Vec<TrafficTarget>>,
}

#[derive(Debug, Default)]
pub struct Certs {
    pub announcer: Announcer,
}

#[derive(Debug, Default)]
pub struct Ingress {
    pub announcer: Announcer,
}

#[derive(Debug)]
pub struct Endpoints {
    id: String,
    pub announcer: Announcer,
    endpoints: RwLock<HashMap<MeshService, Vec<ServiceEndpoint>>>,
    failing: RwLock<bool>,
}

/// A complete set of in-memory collaborators.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub topology: Arc<Topology>,
    pub spec: Arc<Spec>,
    pub certs: Arc<Certs>,
    pub ingress: Arc<Ingress>,
    pub providers: Vec<Arc<Endpoints>>,
}

pub fn mk_svc(ns: &str, name: &str) -> MeshService {
    MeshService::new(ns, name).expect("service name must be valid")
}

pub fn mk_target(name: &str, source: &MeshService, destination: &MeshService) -> TrafficTarget {
    TrafficTarget {
        reference: ObjectRef::new(destination.namespace(), name),
        source: source.clone(),
        destination: destination.clone(),
    }
}

// === impl Mesh ===

impl Mesh {
    pub fn with_providers(ids: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            providers: ids.into_iter().map(|id| Arc::new(Endpoints::new(id))).collect(),
            ..Default::default()
        }
    }

    pub fn catalog(&self, config: MeshConfig) -> MeshCatalog {
        MeshCatalog::new(
            self.topology.clone(),
            self.spec.clone(),
            self.certs.clone(),
            self.ingress.clone(),
            self.providers
                .iter()
                .map(|p| p.clone() as Arc<dyn EndpointProvider>)
                .collect(),
            config,
        )
        .expect("provider ids must be unique")
    }

    /// Registers `service` with the topology and its endpoints with the first
    /// provider.
    pub fn add_service(&self, service: &MeshService, endpoints: impl IntoIterator<Item = ServiceEndpoint>) {
        self.topology.set(service.clone());
        self.providers
            .first()
            .expect("mesh must have an endpoint provider")
            .set(service.clone(), endpoints);
    }
}

// === impl Topology ===

impl Topology {
    pub fn set(&self, service: MeshService) {
        let mut services = self.services.write();
        if !services.contains(&service) {
            services.push(service.clone());
        }
        self.announcer.announce(Announcement::ServiceUpdated(service));
    }
}

impl MeshTopology for Topology {
    fn announcements(&self) -> AnnouncementStream {
        self.announcer.subscribe()
    }

    fn list_services(&self) -> Vec<MeshService> {
        self.services.read().clone()
    }
}

// === impl Spec ===

impl Spec {
    pub fn add(&self, target: TrafficTarget) {
        let reference = target.reference.clone();
        self.targets.write().push(target);
        self.announcer
            .announce(Announcement::TrafficTargetUpdated(reference));
    }
}

impl MeshSpec for Spec {
    fn announcements(&self) -> AnnouncementStream {
        self.announcer.subscribe()
    }

    fn list_traffic_targets(&self) -> Vec<TrafficTarget> {
        self.targets.read().clone()
    }
}

// === impl Certs ===

impl CertManager for Certs {
    fn announcements(&self) -> AnnouncementStream {
        self.announcer.subscribe()
    }

    fn sds_config(&self) -> SdsConfig {
        SdsConfig {
            cluster_name: "sds".to_string(),
            cert_secret_name: "service-cert".to_string(),
            validation_secret_name: "root-cert".to_string(),
        }
    }
}

// === impl Ingress ===

impl IngressMonitor for Ingress {
    fn announcements(&self) -> AnnouncementStream {
        self.announcer.subscribe()
    }
}

// === impl Endpoints ===

impl Endpoints {
    pub fn new(id: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            announcer: Announcer::default(),
            endpoints: Default::default(),
            failing: RwLock::new(false),
        }
    }

    pub fn set(&self, service: MeshService, endpoints: impl IntoIterator<Item = ServiceEndpoint>) {
        self.endpoints
            .write()
            .insert(service.clone(), endpoints.into_iter().collect());
        self.announcer
            .announce(Announcement::EndpointsUpdated(service));
    }

    /// Causes every lookup to fail with an error other than `NotFound`.
    pub fn fail(&self) {
        *self.failing.write() = true;
    }
}

impl EndpointProvider for Endpoints {
    fn id(&self) -> &str {
        &self.id
    }

    fn announcements(&self) -> AnnouncementStream {
        self.announcer.subscribe()
    }

    fn list_endpoints(&self, service: &MeshService) -> Result<Vec<ServiceEndpoint>, EndpointError> {
        if *self.failing.read() {
            return Err(EndpointError::Other(anyhow::anyhow!(
                "{} is unavailable",
                self.id
            )));
        }
        self.endpoints
            .read()
            .get(service)
            .cloned()
            .ok_or_else(|| EndpointError::NotFound(service.clone()))
    }
}
