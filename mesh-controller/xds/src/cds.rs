use crate::{
    encode,
    metrics::{self, SynthesisMetrics},
    transport, DiscoveryResponse, ResponseVersions, Settings, SynthesisError,
};
use envoy_types::pb::{
    envoy::config::cluster::v3::{
        cluster::{ClusterDiscoveryType, DiscoveryType, EdsClusterConfig, LbPolicy},
        Cluster,
    },
    google::protobuf::Duration,
};
use mesh_controller_catalog::MeshCatalog;
use mesh_controller_core::{MeshService, Proxy, SdsConfig};
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration {
    seconds: 5,
    nanos: 0,
};

/// Builds the clusters a proxy may send traffic to.
#[derive(Debug)]
pub struct ClusterSynthesizer {
    catalog: MeshCatalog,
    settings: Settings,
    versions: ResponseVersions,
    metrics: SynthesisMetrics,
}

// === impl ClusterSynthesizer ===

impl ClusterSynthesizer {
    pub fn new(catalog: MeshCatalog, settings: Settings, metrics: SynthesisMetrics) -> Self {
        Self {
            catalog,
            settings,
            versions: ResponseVersions::default(),
            metrics,
        }
    }

    /// Returns the version of the last response produced.
    pub fn version(&self) -> u64 {
        self.versions.current()
    }

    /// Emits one EDS cluster per service the proxy is allowed to reach.
    ///
    /// If any cluster cannot be encoded, no response is produced and the
    /// version is left unchanged.
    pub fn synthesize(&self, proxy: &Proxy) -> Result<DiscoveryResponse, SynthesisError> {
        let sds = self.catalog.sds_config();
        let services = self.catalog.allowed_outbound_services(&proxy.service);
        debug!(%proxy, clusters = services.len(), "Synthesizing clusters");

        let resources = services
            .iter()
            .map(|service| {
                let cluster = self.cluster(service, &sds)?;
                Ok(self.settings.encoder.encode(&cluster)?)
            })
            .collect::<Result<Vec<_>, SynthesisError>>()
            .inspect_err(|error| {
                warn!(%proxy, %error, "Failed to synthesize clusters");
                self.metrics.failed(metrics::CLUSTERS);
            })?;

        let rsp = DiscoveryResponse::new(
            encode::type_url::<Cluster>(),
            self.versions.next(),
            resources,
        );
        debug!(%proxy, version = rsp.version, nonce = %rsp.nonce, "Synthesized clusters");
        self.metrics.responded(metrics::CLUSTERS);
        Ok(rsp)
    }

    fn cluster(&self, service: &MeshService, sds: &SdsConfig) -> Result<Cluster, SynthesisError> {
        let name = service.to_string();
        let tls = transport::upstream_tls_context(
            sds,
            service.server_name(&self.catalog.config().cluster_domain),
        );
        Ok(Cluster {
            name: name.clone(),
            alt_stat_name: name,
            cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds.into())),
            eds_cluster_config: Some(EdsClusterConfig {
                eds_config: Some(transport::grpc_config_source(&self.settings.eds_cluster_name)),
                ..Default::default()
            }),
            connect_timeout: Some(CONNECT_TIMEOUT),
            lb_policy: LbPolicy::RoundRobin.into(),
            transport_socket: Some(transport::tls_transport_socket(
                &self.settings.encoder,
                &tls,
            )?),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Encoder;
    use envoy_types::pb::envoy::{
        config::core::v3::{
            config_source::ConfigSourceSpecifier, grpc_service::TargetSpecifier,
            transport_socket::ConfigType,
        },
        extensions::transport_sockets::tls::v3::{
            common_tls_context::ValidationContextType, UpstreamTlsContext,
        },
    };
    use mesh_controller_catalog::testing::{mk_svc, mk_target, Mesh};
    use mesh_controller_core::{MeshConfig, ServiceEndpoint};
    use pretty_assertions::assert_eq;
    use prost::Message;
    use std::net::Ipv4Addr;

    fn mk_mesh() -> (Mesh, Proxy) {
        let mesh = Mesh::with_providers(["kubernetes"]);
        let bookbuyer = mk_svc("default", "bookbuyer");
        let bookstore = mk_svc("default", "bookstore");
        let bookthief = mk_svc("default", "bookthief");
        for svc in [&bookbuyer, &bookstore, &bookthief] {
            mesh.add_service(svc, [ServiceEndpoint::new(Ipv4Addr::new(10, 0, 0, 1), 80)]);
        }
        mesh.spec.add(mk_target("bookstore", &bookbuyer, &bookstore));
        let proxy = Proxy {
            common_name: "bookbuyer.default".to_string(),
            service: bookbuyer,
        };
        (mesh, proxy)
    }

    fn decode(rsp: &DiscoveryResponse) -> Vec<Cluster> {
        rsp.resources
            .iter()
            .map(|any| {
                assert_eq!(any.type_url, encode::type_url::<Cluster>());
                Cluster::decode(any.value.as_slice()).expect("cluster must decode")
            })
            .collect()
    }

    #[test]
    fn clusters_for_allowed_destinations() {
        let (mesh, proxy) = mk_mesh();
        let cds = ClusterSynthesizer::new(
            mesh.catalog(MeshConfig::default()),
            Settings::default(),
            SynthesisMetrics::default(),
        );

        let rsp = cds.synthesize(&proxy).expect("synthesis must succeed");
        assert_eq!(rsp.version_info(), "v1");
        assert_eq!(rsp.type_url, "type.googleapis.com/envoy.config.cluster.v3.Cluster");

        let clusters = decode(&rsp);
        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        assert_eq!(cluster.name, "default/bookstore");
        assert_eq!(cluster.alt_stat_name, "default/bookstore");
        assert_eq!(
            cluster.cluster_discovery_type,
            Some(ClusterDiscoveryType::Type(DiscoveryType::Eds.into()))
        );
        assert_eq!(cluster.lb_policy(), LbPolicy::RoundRobin);
        assert_eq!(
            cluster.connect_timeout,
            Some(Duration {
                seconds: 5,
                nanos: 0
            })
        );

        let eds = cluster
            .eds_cluster_config
            .as_ref()
            .and_then(|c| c.eds_config.as_ref())
            .and_then(|c| c.config_source_specifier.as_ref());
        let Some(ConfigSourceSpecifier::ApiConfigSource(eds)) = eds else {
            panic!("EDS must be served by an API config source: {eds:?}");
        };
        let Some(TargetSpecifier::EnvoyGrpc(grpc)) = &eds.grpc_services[0].target_specifier else {
            panic!("EDS must be served by an Envoy gRPC cluster");
        };
        assert_eq!(grpc.cluster_name, "eds");

        let socket = cluster.transport_socket.as_ref().unwrap();
        assert_eq!(socket.name, "envoy.transport_sockets.tls");
        let Some(ConfigType::TypedConfig(config)) = &socket.config_type else {
            panic!("transport socket must have a typed config");
        };
        let tls = UpstreamTlsContext::decode(config.value.as_slice()).unwrap();
        assert_eq!(tls.sni, "bookstore.default.svc.cluster.local");
        let common = tls.common_tls_context.unwrap();
        assert_eq!(common.alpn_protocols, ["istio-peer-exchange", "istio"]);
        assert_eq!(common.tls_certificate_sds_secret_configs[0].name, "service-cert");
        let Some(ValidationContextType::ValidationContextSdsSecretConfig(validation)) =
            common.validation_context_type
        else {
            panic!("validation context must be delegated to SDS");
        };
        assert_eq!(validation.name, "root-cert");
    }

    #[test]
    fn permissive_mode_allows_every_other_service() {
        let (mesh, proxy) = mk_mesh();
        let cds = ClusterSynthesizer::new(
            mesh.catalog(MeshConfig {
                permissive_traffic_policy_mode: true,
                ..Default::default()
            }),
            Settings::default(),
            SynthesisMetrics::default(),
        );

        let rsp = cds.synthesize(&proxy).expect("synthesis must succeed");
        let names = decode(&rsp).into_iter().map(|c| c.name).collect::<Vec<_>>();
        assert_eq!(names, ["default/bookstore", "default/bookthief"]);
    }

    #[test]
    fn versions_increase_with_fresh_nonces() {
        let (mesh, proxy) = mk_mesh();
        let cds = ClusterSynthesizer::new(
            mesh.catalog(MeshConfig::default()),
            Settings::default(),
            SynthesisMetrics::default(),
        );

        let mut nonces = std::collections::HashSet::new();
        for expected in 1..=10 {
            let rsp = cds.synthesize(&proxy).expect("synthesis must succeed");
            assert_eq!(rsp.version, expected);
            assert!(nonces.insert(rsp.nonce), "nonce must not repeat");
        }
        assert_eq!(cds.version(), 10);
    }

    #[test]
    fn encoding_failure_keeps_version() {
        let (mesh, proxy) = mk_mesh();
        let metrics = SynthesisMetrics::default();
        let cds = ClusterSynthesizer::new(
            mesh.catalog(MeshConfig::default()),
            Settings {
                encoder: Encoder::new(64),
                ..Default::default()
            },
            metrics.clone(),
        );

        let err = cds.synthesize(&proxy).expect_err("synthesis must fail");
        assert!(matches!(err, SynthesisError::Encode(_)), "{err}");
        assert_eq!(cds.version(), 0);
        assert_eq!(metrics.failures(metrics::CLUSTERS), 1);
        assert_eq!(metrics.responses(metrics::CLUSTERS), 0);
    }

    #[test]
    fn no_destinations_is_an_empty_response() {
        let (mesh, _) = mk_mesh();
        let cds = ClusterSynthesizer::new(
            mesh.catalog(MeshConfig::default()),
            Settings::default(),
            SynthesisMetrics::default(),
        );

        let proxy = Proxy {
            common_name: "bookthief.default".to_string(),
            service: mk_svc("default", "bookthief"),
        };
        let rsp = cds.synthesize(&proxy).expect("synthesis must succeed");
        assert!(rsp.resources.is_empty());
        assert_eq!(rsp.version, 1);
    }
}
