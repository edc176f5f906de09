#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Mesh state shared by the catalog and the discovery-resource synthesizers.
//!
//! Collaborators (the topology store, the traffic-policy store, the
//! certificate manager, the ingress monitor and every endpoint provider) are
//! modeled as traits so that the catalog never depends on how their state is
//! obtained. Each collaborator exposes a stream of [`Announcement`]s that the
//! catalog fans in to schedule configuration recomputation.

mod announce;
mod cert;
mod config;
pub mod endpoint;
mod policy;
mod proxy;
mod service;

pub use self::{
    announce::{Announcement, AnnouncementKind, AnnouncementStream, Announcer, ObjectRef},
    cert::{CertManager, SdsConfig},
    config::MeshConfig,
    endpoint::{EndpointError, EndpointProvider, ServiceEndpoint},
    policy::{MeshSpec, TrafficTarget},
    proxy::Proxy,
    service::{InvalidService, MeshService},
};

/// Serves the set of services known to the mesh.
pub trait MeshTopology: Send + Sync {
    fn announcements(&self) -> AnnouncementStream;

    fn list_services(&self) -> Vec<MeshService>;
}

/// Observes ingress rules. Only change notifications are consumed.
pub trait IngressMonitor: Send + Sync {
    fn announcements(&self) -> AnnouncementStream;
}
