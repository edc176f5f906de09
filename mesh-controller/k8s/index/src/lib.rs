//! Kubernetes-backed mesh collaborators.
//!
//! Each index is updated by a single kubert watch task and read concurrently
//! through a cheap handle that implements one of the catalog's collaborator
//! traits:
//!
//! - `Service`s form the mesh topology.
//! - `EndpointSlice`s back the `kubernetes` endpoint provider.
//! - SMI `TrafficTarget`s form the traffic policy.
//! - `Ingress`es are only observed for changes.
//!
//! Every index publishes an announcement when the state it serves changes.
//! Re-applying a resource that does not change the served state is silent,
//! so watch restarts do not trigger reconciliation storms.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod endpoints;
mod ingress;
mod metrics;
mod services;
mod traffic_targets;


pub use self::{
    endpoints::{EndpointIndex, KubernetesEndpoints, SharedEndpointIndex},
    ingress::{IngressIndex, Ingresses, SharedIngressIndex},
    metrics::{IndexMetrics, SizedIndex},
    services::{ServiceIndex, SharedServiceIndex, Topology},
    traffic_targets::{SharedTrafficTargetIndex, TrafficTargetIndex, TrafficTargets},
};
use mesh_controller_core::MeshService;
use mesh_controller_k8s_api::ResourceExt;

/// Names the mesh service backing a namespaced resource, logging resources
/// whose names cannot name a service.
fn mesh_service(namespace: &str, name: &str) -> Option<MeshService> {
    MeshService::new(namespace, name)
        .map_err(|error| tracing::warn!(%error, namespace, name, "Ignoring invalid service"))
        .ok()
}

/// Returns the namespace and name of a namespaced resource.
fn namespaced_name<R: ResourceExt>(resource: &R) -> (String, String) {
    (resource.namespace().unwrap_or_default(), resource.name_unchecked())
}
