#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Discovery-resource synthesis.
//!
//! Synthesizers compile the catalog's view of the mesh into Envoy resources
//! for a single proxy. Each synthesizer owns the version counter for the kind
//! of resource it emits; the counter only advances when a complete response
//! has been built.

mod cds;
mod encode;
mod lds;
mod metrics;
mod response;
mod transport;
mod version;

#[cfg(test)]
mod tests;

pub use self::{
    cds::ClusterSynthesizer,
    encode::{EncodeError, Encoder, DEFAULT_MAX_MESSAGE_BYTES},
    lds::{ListenerBuilder, ListenerSynthesizer},
    metrics::SynthesisMetrics,
    response::DiscoveryResponse,
    transport::ALPN_IN_MESH,
    version::{ResponseVersions, Stamp},
};
use mesh_controller_catalog::ResolveError;
use mesh_controller_core::MeshService;

/// Settings shared by all synthesizers.
#[derive(Clone, Debug)]
pub struct Settings {
    /// The statically-configured cluster that serves endpoint discovery.
    pub eds_cluster_name: String,
    pub encoder: Encoder,
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("service {0} has no endpoints")]
    NoEndpoints(MeshService),

    #[error("failed to encode resource")]
    Encode(#[from] EncodeError),
}

// === impl Settings ===

impl Default for Settings {
    fn default() -> Self {
        Self {
            eds_cluster_name: "eds".to_string(),
            encoder: Encoder::default(),
        }
    }
}
