use super::ListenerBuilder;
use crate::SynthesisError;
use envoy_types::pb::{
    envoy::config::{
        core::v3::CidrRange,
        listener::v3::{FilterChain, FilterChainMatch},
    },
    google::protobuf::UInt32Value,
};
use ipnet::IpNet;
use mesh_controller_core::MeshService;
use std::collections::BTreeSet;

pub(super) const OUTBOUND_ROUTE_CONFIG: &str = "RDS_Outbound";

/// Protocols a local application may originate. TLS-negotiated protocols are
/// excluded since in-mesh clients send plaintext to their proxy.
const DOWNSTREAM_HTTP_PROTOCOLS: [&str; 3] = ["http/1.0", "http/1.1", "h2c"];

impl ListenerBuilder {
    /// Builds the chain that matches traffic sent to `destination`'s
    /// endpoints.
    ///
    /// Fails if the destination's endpoints cannot be resolved or if it has
    /// none; a chain without addresses would never match.
    pub fn build_outbound_filter_chain(
        &self,
        destination: &MeshService,
    ) -> Result<FilterChain, SynthesisError> {
        let filter =
            self.http_connection_manager(OUTBOUND_ROUTE_CONFIG, format!("outbound.{destination}"))?;
        let filter_chain_match = self.outbound_filter_chain_match(destination)?;
        Ok(FilterChain {
            name: destination.to_string(),
            filters: vec![filter],
            filter_chain_match: Some(filter_chain_match),
            ..Default::default()
        })
    }

    fn outbound_filter_chain_match(
        &self,
        destination: &MeshService,
    ) -> Result<FilterChainMatch, SynthesisError> {
        let endpoints = self.catalog.resolvable_service_endpoints(destination)?;
        if endpoints.is_empty() {
            return Err(SynthesisError::NoEndpoints(destination.clone()));
        }

        // Endpoints that share an address differ only by port.
        let prefixes = endpoints
            .iter()
            .map(|ep| IpNet::from(ep.ip))
            .collect::<BTreeSet<_>>();

        Ok(FilterChainMatch {
            prefix_ranges: prefixes.into_iter().map(cidr_range).collect(),
            application_protocols: DOWNSTREAM_HTTP_PROTOCOLS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            ..Default::default()
        })
    }
}

fn cidr_range(net: IpNet) -> CidrRange {
    CidrRange {
        address_prefix: net.addr().to_string(),
        prefix_len: Some(UInt32Value {
            value: net.prefix_len().into(),
        }),
    }
}
