use crate::version::Stamp;
use envoy_types::pb::{envoy::service::discovery::v3, google::protobuf::Any};

/// A versioned, nonce-tagged set of resources of a single kind.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveryResponse {
    pub type_url: String,
    pub version: u64,
    pub nonce: String,
    pub resources: Vec<Any>,
}

// === impl DiscoveryResponse ===

impl DiscoveryResponse {
    pub(crate) fn new(type_url: String, Stamp { version, nonce }: Stamp, resources: Vec<Any>) -> Self {
        Self {
            type_url,
            version,
            nonce,
            resources,
        }
    }

    /// The version as it is reported to proxies.
    pub fn version_info(&self) -> String {
        format!("v{}", self.version)
    }

    pub fn into_proto(self) -> v3::DiscoveryResponse {
        v3::DiscoveryResponse {
            version_info: self.version_info(),
            resources: self.resources,
            type_url: self.type_url,
            nonce: self.nonce,
            ..Default::default()
        }
    }
}
