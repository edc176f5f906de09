use crate::{
    encode::{self, EncodeError, Encoder},
    metrics::{self, SynthesisMetrics},
    transport, DiscoveryResponse, ResponseVersions, SynthesisError,
};
use envoy_types::pb::{
    envoy::{
        config::{
            core::v3::TrafficDirection,
            listener::v3::{filter, listener_filter, Filter, FilterChain, Listener, ListenerFilter},
        },
        extensions::filters::{
            http::router::v3::Router,
            listener::{
                http_inspector::v3::HttpInspector, original_dst::v3::OriginalDst,
                tls_inspector::v3::TlsInspector,
            },
            network::http_connection_manager::v3::{
                http_connection_manager::{CodecType, RouteSpecifier},
                http_filter, HttpConnectionManager, HttpFilter, Rds,
            },
        },
    },
    google::protobuf::Any,
};
use mesh_controller_catalog::MeshCatalog;
use mesh_controller_core::{MeshService, Proxy};
use prost::Name;
use tracing::{debug, warn};

mod inbound;
mod outbound;
mod rbac;

#[cfg(test)]
mod tests;

const HTTP_CONNECTION_MANAGER: &str = "envoy.filters.network.http_connection_manager";
const HTTP_ROUTER: &str = "envoy.filters.http.router";

const INBOUND_LISTENER: &str = "inbound-listener";
const INBOUND_PORT: u16 = 15003;
const OUTBOUND_LISTENER: &str = "outbound-listener";
const OUTBOUND_PORT: u16 = 15001;

/// Builds the filter chains of a proxy's listeners.
#[derive(Clone, Debug)]
pub struct ListenerBuilder {
    catalog: MeshCatalog,
    encoder: Encoder,
}

/// Builds a proxy's inbound and outbound listeners.
#[derive(Debug)]
pub struct ListenerSynthesizer {
    builder: ListenerBuilder,
    versions: ResponseVersions,
    metrics: SynthesisMetrics,
}

// === impl ListenerBuilder ===

impl ListenerBuilder {
    pub fn new(catalog: MeshCatalog, encoder: Encoder) -> Self {
        Self { catalog, encoder }
    }

    fn http_connection_manager(
        &self,
        route_config_name: &str,
        stat_prefix: String,
    ) -> Result<Filter, EncodeError> {
        let router = HttpFilter {
            name: HTTP_ROUTER.to_string(),
            config_type: Some(http_filter::ConfigType::TypedConfig(
                self.encoder.encode(&Router::default())?,
            )),
            ..Default::default()
        };
        let hcm = HttpConnectionManager {
            codec_type: CodecType::Auto.into(),
            stat_prefix,
            route_specifier: Some(RouteSpecifier::Rds(Rds {
                config_source: Some(transport::ads_config_source()),
                route_config_name: route_config_name.to_string(),
            })),
            http_filters: vec![router],
            ..Default::default()
        };
        self.network_filter(HTTP_CONNECTION_MANAGER, &hcm)
    }

    fn network_filter<M: Name>(&self, name: &str, config: &M) -> Result<Filter, EncodeError> {
        Ok(Filter {
            name: name.to_string(),
            config_type: Some(filter::ConfigType::TypedConfig(self.encoder.encode(config)?)),
        })
    }

    fn listener_filter<M: Name + Default>(&self, name: &str) -> Result<ListenerFilter, EncodeError> {
        Ok(ListenerFilter {
            name: name.to_string(),
            config_type: Some(listener_filter::ConfigType::TypedConfig(
                self.encoder.encode(&M::default())?,
            )),
            ..Default::default()
        })
    }
}

// === impl ListenerSynthesizer ===

impl ListenerSynthesizer {
    pub fn new(catalog: MeshCatalog, encoder: Encoder, metrics: SynthesisMetrics) -> Self {
        Self {
            builder: ListenerBuilder::new(catalog, encoder),
            versions: ResponseVersions::default(),
            metrics,
        }
    }

    pub fn builder(&self) -> &ListenerBuilder {
        &self.builder
    }

    /// Returns the version of the last response produced.
    pub fn version(&self) -> u64 {
        self.versions.current()
    }

    /// Emits the proxy's inbound and outbound listeners.
    ///
    /// Outbound chains that cannot be built are logged and skipped; a
    /// listener left without any chain is omitted. Failing to encode a
    /// listener fails the whole pass and leaves the version unchanged.
    pub fn synthesize(&self, proxy: &Proxy) -> Result<DiscoveryResponse, SynthesisError> {
        self.listeners(proxy)
            .inspect_err(|error| {
                warn!(%proxy, %error, "Failed to synthesize listeners");
                self.metrics.failed(metrics::LISTENERS);
            })
            .map(|resources| {
                let rsp = DiscoveryResponse::new(
                    encode::type_url::<Listener>(),
                    self.versions.next(),
                    resources,
                );
                debug!(%proxy, version = rsp.version, nonce = %rsp.nonce, "Synthesized listeners");
                self.metrics.responded(metrics::LISTENERS);
                rsp
            })
    }

    fn listeners(&self, proxy: &Proxy) -> Result<Vec<Any>, SynthesisError> {
        let encoder = &self.builder.encoder;
        let mut resources = Vec::with_capacity(2);

        let inbound = self.builder.build_inbound_filter_chains(&proxy.service);
        if inbound.is_empty() {
            debug!(%proxy, "No inbound filter chains");
        } else {
            let listener = Listener {
                name: INBOUND_LISTENER.to_string(),
                address: Some(transport::socket_address("0.0.0.0", INBOUND_PORT)),
                filter_chains: inbound,
                listener_filters: vec![self
                    .builder
                    .listener_filter::<TlsInspector>("envoy.filters.listener.tls_inspector")?],
                traffic_direction: TrafficDirection::Inbound.into(),
                ..Default::default()
            };
            resources.push(encoder.encode(&listener)?);
        }

        let outbound = self.outbound_filter_chains(&proxy.service);
        if outbound.is_empty() {
            debug!(%proxy, "No outbound filter chains");
        } else {
            let listener = Listener {
                name: OUTBOUND_LISTENER.to_string(),
                address: Some(transport::socket_address("0.0.0.0", OUTBOUND_PORT)),
                filter_chains: outbound,
                listener_filters: vec![
                    self.builder
                        .listener_filter::<OriginalDst>("envoy.filters.listener.original_dst")?,
                    self.builder
                        .listener_filter::<HttpInspector>("envoy.filters.listener.http_inspector")?,
                ],
                traffic_direction: TrafficDirection::Outbound.into(),
                ..Default::default()
            };
            resources.push(encoder.encode(&listener)?);
        }

        Ok(resources)
    }

    /// Builds one chain per allowed destination, logging the destinations for
    /// which no chain could be built.
    fn outbound_filter_chains(&self, service: &MeshService) -> Vec<FilterChain> {
        let (chains, failures) = self
            .builder
            .catalog
            .allowed_outbound_services(service)
            .into_iter()
            .fold((Vec::new(), 0usize), |(mut chains, failures), dst| {
                match self.builder.build_outbound_filter_chain(&dst) {
                    Ok(chain) => {
                        chains.push(chain);
                        (chains, failures)
                    }
                    Err(error) => {
                        warn!(%service, destination = %dst, %error, "Skipping outbound filter chain");
                        (chains, failures + 1)
                    }
                }
            });
        debug!(%service, chains = chains.len(), failures, "Built outbound filter chains");
        chains
    }
}
