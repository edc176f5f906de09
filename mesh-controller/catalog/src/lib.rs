#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Mesh Catalog
//!
//! The catalog joins the mesh's collaborators into a single view:
//!
//! - Every collaborator publishes change notifications. The catalog exposes
//!   them as a fixed, named list of [`AnnouncementChannel`]s.
//! - The [`Dispatcher`] merges those channels and publishes one
//!   [`ReconcileEvent`] on the [`EventBus`] per notification, so consumers
//!   never need to know which collaborator changed.
//! - Synthesizers query the catalog for the services a proxy may reach and
//!   for the endpoints currently backing a service.
//!
//! ```text
//! [ Services ] [ MeshSpec ] [ CertManager ] [ IngressMonitor ] [ Endpoints.. ] [ Ticker ]
//!       \           \             |                /                 /            /
//!        +-----------+------> [ Dispatcher ] --> [ EventBus ] --> broadcaster
//! ```

mod announcements;
mod dispatch;
mod endpoints;
mod events;
mod metrics;
mod services;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;


pub use self::{
    announcements::AnnouncementChannel,
    dispatch::Dispatcher,
    endpoints::ResolveError,
    events::{EventBus, EventTopic, ReconcileEvent},
    metrics::DispatchMetrics,
};
use mesh_controller_core::{
    CertManager, EndpointProvider, IngressMonitor, MeshConfig, MeshSpec, MeshTopology, SdsConfig,
};
use std::{collections::HashSet, sync::Arc};

/// Provides a joined view over the mesh's collaborators.
///
/// The set of collaborators is fixed at construction.
#[derive(Clone)]
pub struct MeshCatalog {
    topology: Arc<dyn MeshTopology>,
    mesh_spec: Arc<dyn MeshSpec>,
    cert_manager: Arc<dyn CertManager>,
    ingress_monitor: Arc<dyn IngressMonitor>,
    endpoint_providers: Arc<[Arc<dyn EndpointProvider>]>,
    config: Arc<MeshConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("endpoint provider {0:?} is configured more than once")]
pub struct DuplicateProvider(pub String);

// === impl MeshCatalog ===

impl MeshCatalog {
    pub fn new(
        topology: Arc<dyn MeshTopology>,
        mesh_spec: Arc<dyn MeshSpec>,
        cert_manager: Arc<dyn CertManager>,
        ingress_monitor: Arc<dyn IngressMonitor>,
        endpoint_providers: Vec<Arc<dyn EndpointProvider>>,
        config: MeshConfig,
    ) -> Result<Self, DuplicateProvider> {
        let mut ids = HashSet::new();
        for provider in &endpoint_providers {
            if !ids.insert(provider.id()) {
                return Err(DuplicateProvider(provider.id().to_string()));
            }
        }

        tracing::info!(
            providers = endpoint_providers.len(),
            permissive = config.permissive_traffic_policy_mode,
            "Created mesh catalog"
        );
        Ok(Self {
            topology,
            mesh_spec,
            cert_manager,
            ingress_monitor,
            endpoint_providers: endpoint_providers.into(),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn sds_config(&self) -> SdsConfig {
        self.cert_manager.sds_config()
    }
}

impl std::fmt::Debug for MeshCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshCatalog")
            .field(
                "endpoint_providers",
                &self
                    .endpoint_providers
                    .iter()
                    .map(|p| p.id())
                    .collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
