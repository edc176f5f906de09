//! Config sources, addresses and TLS contexts shared by clusters and
//! listeners.
//!
//! Certificate material is never inlined: every TLS context refers to secrets
//! served by the SDS cluster.

use crate::encode::{EncodeError, Encoder};
use envoy_types::pb::{
    envoy::{
        config::core::v3::{
            address, api_config_source::ApiType, config_source::ConfigSourceSpecifier,
            grpc_service::{EnvoyGrpc, TargetSpecifier}, socket_address::PortSpecifier,
            transport_socket::ConfigType, Address, AggregatedConfigSource, ApiConfigSource,
            ApiVersion, ConfigSource, GrpcService, SocketAddress, TransportSocket,
        },
        extensions::transport_sockets::tls::v3::{
            common_tls_context::ValidationContextType, CommonTlsContext, DownstreamTlsContext,
            SdsSecretConfig, UpstreamTlsContext,
        },
    },
    google::protobuf::BoolValue,
};
use mesh_controller_core::SdsConfig;

pub const TLS_TRANSPORT_SOCKET: &str = "envoy.transport_sockets.tls";

/// Protocols advertised by proxies when connecting to other proxies.
pub const ALPN_IN_MESH: [&str; 2] = ["istio-peer-exchange", "istio"];

/// A config source served over gRPC by the statically-configured `cluster`.
pub(crate) fn grpc_config_source(cluster: &str) -> ConfigSource {
    let api = ApiConfigSource {
        api_type: ApiType::Grpc.into(),
        transport_api_version: ApiVersion::V3.into(),
        grpc_services: vec![GrpcService {
            target_specifier: Some(TargetSpecifier::EnvoyGrpc(EnvoyGrpc {
                cluster_name: cluster.to_string(),
                ..Default::default()
            })),
            ..Default::default()
        }],
        ..Default::default()
    };
    ConfigSource {
        config_source_specifier: Some(ConfigSourceSpecifier::ApiConfigSource(api)),
        resource_api_version: ApiVersion::V3.into(),
        ..Default::default()
    }
}

/// A config source served over the proxy's aggregated discovery stream.
pub(crate) fn ads_config_source() -> ConfigSource {
    ConfigSource {
        config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource {})),
        resource_api_version: ApiVersion::V3.into(),
        ..Default::default()
    }
}

pub(crate) fn socket_address(ip: &str, port: u16) -> Address {
    Address {
        address: Some(address::Address::SocketAddress(SocketAddress {
            address: ip.to_string(),
            port_specifier: Some(PortSpecifier::PortValue(port.into())),
            ..Default::default()
        })),
    }
}

pub(crate) fn upstream_tls_context(sds: &SdsConfig, sni: String) -> UpstreamTlsContext {
    UpstreamTlsContext {
        common_tls_context: Some(common_tls_context(sds, &ALPN_IN_MESH)),
        sni,
        ..Default::default()
    }
}

/// A server-side context that requires clients to present a certificate.
pub(crate) fn downstream_tls_context(sds: &SdsConfig) -> DownstreamTlsContext {
    DownstreamTlsContext {
        common_tls_context: Some(common_tls_context(sds, &[])),
        require_client_certificate: Some(BoolValue { value: true }),
        ..Default::default()
    }
}

pub(crate) fn tls_transport_socket<M: prost::Name>(
    encoder: &Encoder,
    context: &M,
) -> Result<TransportSocket, EncodeError> {
    Ok(TransportSocket {
        name: TLS_TRANSPORT_SOCKET.to_string(),
        config_type: Some(ConfigType::TypedConfig(encoder.encode(context)?)),
    })
}

fn common_tls_context(sds: &SdsConfig, alpn: &[&str]) -> CommonTlsContext {
    let secret = |name: &str| SdsSecretConfig {
        name: name.to_string(),
        sds_config: Some(grpc_config_source(&sds.cluster_name)),
    };
    CommonTlsContext {
        alpn_protocols: alpn.iter().map(|p| p.to_string()).collect(),
        tls_certificate_sds_secret_configs: vec![secret(&sds.cert_secret_name)],
        validation_context_type: Some(ValidationContextType::ValidationContextSdsSecretConfig(
            secret(&sds.validation_secret_name),
        )),
        ..Default::default()
    }
}
