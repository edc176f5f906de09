use super::ListenerBuilder;
use crate::{transport, SynthesisError, ALPN_IN_MESH};
use envoy_types::pb::envoy::config::listener::v3::{Filter, FilterChain, FilterChainMatch};
use mesh_controller_core::MeshService;
use tracing::error;

pub(super) const INBOUND_ROUTE_CONFIG: &str = "RDS_Inbound";
const INBOUND_MESH_FILTER_CHAIN: &str = "inbound-mesh-filter-chain";
const TRANSPORT_PROTOCOL_TLS: &str = "tls";

impl ListenerBuilder {
    /// Builds the chains that accept in-mesh traffic for `service`.
    ///
    /// Only an HTTP chain is produced. A chain that cannot be built is logged
    /// and omitted, which may leave the list empty.
    pub fn build_inbound_filter_chains(&self, service: &MeshService) -> Vec<FilterChain> {
        let mut chains = Vec::with_capacity(1);
        match self.inbound_http_filter_chain(service) {
            Ok(chain) => chains.push(chain),
            Err(error) => error!(%service, %error, "Failed to build inbound HTTP filter chain"),
        }
        chains
    }

    fn inbound_http_filter_chain(&self, service: &MeshService) -> Result<FilterChain, SynthesisError> {
        let filters = self.inbound_http_filters(service)?;
        let cluster_domain = &self.catalog.config().cluster_domain;
        let tls = transport::downstream_tls_context(&self.catalog.sds_config());
        Ok(FilterChain {
            name: INBOUND_MESH_FILTER_CHAIN.to_string(),
            filters,
            filter_chain_match: Some(FilterChainMatch {
                server_names: vec![service.server_name(cluster_domain)],
                transport_protocol: TRANSPORT_PROTOCOL_TLS.to_string(),
                application_protocols: ALPN_IN_MESH.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            }),
            transport_socket: Some(transport::tls_transport_socket(&self.encoder, &tls)?),
            ..Default::default()
        })
    }

    /// Access is enforced before any HTTP processing unless the mesh is in
    /// permissive mode.
    fn inbound_http_filters(&self, service: &MeshService) -> Result<Vec<Filter>, SynthesisError> {
        let mut filters = Vec::with_capacity(2);
        if !self.catalog.config().permissive_traffic_policy_mode {
            filters.push(self.rbac_filter(service)?);
        }
        filters.push(self.http_connection_manager(INBOUND_ROUTE_CONFIG, format!("inbound.{service}"))?);
        Ok(filters)
    }
}
