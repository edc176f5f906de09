use super::*;
use envoy_types::pb::{
    envoy::{
        config::{
            core::v3::{transport_socket, CidrRange},
            listener::v3::FilterChainMatch,
            rbac::v3::{principal::Identifier, rbac::Action},
        },
        extensions::{
            filters::network::rbac::v3::Rbac,
            transport_sockets::tls::v3::{
                common_tls_context::ValidationContextType, DownstreamTlsContext,
            },
        },
        r#type::matcher::v3::string_matcher::MatchPattern,
    },
    google::protobuf::{BoolValue, UInt32Value},
};
use mesh_controller_catalog::{
    testing::{mk_svc, mk_target, Mesh},
    ResolveError,
};
use mesh_controller_core::{MeshConfig, ServiceEndpoint};
use pretty_assertions::assert_eq;
use prost::Message;
use std::net::Ipv4Addr;

fn mk_mesh() -> Mesh {
    let mesh = Mesh::with_providers(["kubernetes"]);
    let bookbuyer = mk_svc("default", "bookbuyer");
    let bookstore = mk_svc("default", "bookstore");
    mesh.add_service(&bookbuyer, [ServiceEndpoint::new(Ipv4Addr::new(10, 0, 0, 9), 80)]);
    mesh.add_service(
        &bookstore,
        [
            ServiceEndpoint::new(Ipv4Addr::new(10, 0, 0, 1), 80),
            ServiceEndpoint::new(Ipv4Addr::new(10, 0, 0, 2), 80),
        ],
    );
    mesh.spec.add(mk_target("bookstore-access", &bookbuyer, &bookstore));
    mesh
}

fn mk_builder(mesh: &Mesh, permissive: bool) -> ListenerBuilder {
    let catalog = mesh.catalog(MeshConfig {
        permissive_traffic_policy_mode: permissive,
        ..Default::default()
    });
    ListenerBuilder::new(catalog, Encoder::default())
}

fn filter_names(chain: &FilterChain) -> Vec<&str> {
    chain.filters.iter().map(|f| f.name.as_str()).collect()
}

fn decode<M: Message + Default>(any: &Any) -> M {
    M::decode(any.value.as_slice()).expect("typed config must decode")
}

fn filter_config<M: Message + Default>(filter: &Filter) -> M {
    match &filter.config_type {
        Some(filter::ConfigType::TypedConfig(any)) => decode(any),
        other => panic!("unexpected filter config: {other:?}"),
    }
}

fn hcm_route_config(hcm: HttpConnectionManager) -> Option<String> {
    match hcm.route_specifier {
        Some(RouteSpecifier::Rds(rds)) => Some(rds.route_config_name),
        _ => None,
    }
}

fn prefix_range(address: &str, len: u32) -> CidrRange {
    CidrRange {
        address_prefix: address.to_string(),
        prefix_len: Some(UInt32Value { value: len }),
    }
}

#[test]
fn inbound_chain_enforces_access_first() {
    let mesh = mk_mesh();
    let chains = mk_builder(&mesh, false).build_inbound_filter_chains(&mk_svc("default", "bookstore"));
    assert_eq!(chains.len(), 1);

    let chain = &chains[0];
    assert_eq!(chain.name, "inbound-mesh-filter-chain");
    assert_eq!(
        filter_names(chain),
        [
            "envoy.filters.network.rbac",
            "envoy.filters.network.http_connection_manager"
        ]
    );
    assert_eq!(
        chain.filter_chain_match,
        Some(FilterChainMatch {
            server_names: vec!["bookstore.default.svc.cluster.local".to_string()],
            transport_protocol: "tls".to_string(),
            application_protocols: vec!["istio-peer-exchange".to_string(), "istio".to_string()],
            ..Default::default()
        })
    );

    let socket = chain.transport_socket.as_ref().expect("chain must terminate TLS");
    assert_eq!(socket.name, "envoy.transport_sockets.tls");
    let tls = match &socket.config_type {
        Some(transport_socket::ConfigType::TypedConfig(any)) => decode::<DownstreamTlsContext>(any),
        other => panic!("unexpected transport socket config: {other:?}"),
    };
    assert_eq!(tls.require_client_certificate, Some(BoolValue { value: true }));
    let common = tls.common_tls_context.expect("context must delegate to SDS");
    assert_eq!(common.tls_certificate_sds_secret_configs[0].name, "service-cert");
    match common.validation_context_type {
        Some(ValidationContextType::ValidationContextSdsSecretConfig(sds)) => {
            assert_eq!(sds.name, "root-cert")
        }
        other => panic!("unexpected validation context: {other:?}"),
    }

    let hcm = filter_config::<HttpConnectionManager>(&chain.filters[1]);
    assert_eq!(hcm_route_config(hcm), Some("RDS_Inbound".to_string()));
}

#[test]
fn inbound_chain_in_permissive_mode_skips_access_control() {
    let mesh = mk_mesh();
    let chains = mk_builder(&mesh, true).build_inbound_filter_chains(&mk_svc("default", "bookstore"));
    assert_eq!(chains.len(), 1);
    assert_eq!(
        filter_names(&chains[0]),
        ["envoy.filters.network.http_connection_manager"]
    );
}

#[test]
fn inbound_chain_is_omitted_when_it_cannot_be_encoded() {
    let mesh = mk_mesh();
    let builder = ListenerBuilder::new(mesh.catalog(MeshConfig::default()), Encoder::new(8));
    let chains = builder.build_inbound_filter_chains(&mk_svc("default", "bookstore"));
    assert!(chains.is_empty());
}

#[test]
fn rbac_allows_traffic_target_sources() {
    let mesh = mk_mesh();
    let bookstore = mk_svc("default", "bookstore");
    mesh.spec.add(mk_target(
        "bookstore-access",
        &mk_svc("default", "bookthief"),
        &bookstore,
    ));
    mesh.spec.add(mk_target(
        "bookstore-audit",
        &mk_svc("audit", "auditor"),
        &bookstore,
    ));

    let chains = mk_builder(&mesh, false).build_inbound_filter_chains(&bookstore);
    let rbac = filter_config::<Rbac>(&chains[0].filters[0]);
    let rules = rbac.rules.expect("filter must have rules");
    assert_eq!(rules.action(), Action::Allow);

    let mut principals = rules
        .policies
        .iter()
        .map(|(name, policy)| {
            assert_eq!(policy.permissions, [rbac::any_permission()]);
            let names = policy
                .principals
                .iter()
                .map(|p| match &p.identifier {
                    Some(Identifier::Authenticated(authn)) => {
                        match authn.principal_name.as_ref().and_then(|m| m.match_pattern.as_ref()) {
                            Some(MatchPattern::Exact(name)) => name.clone(),
                            other => panic!("unexpected principal match: {other:?}"),
                        }
                    }
                    other => panic!("unexpected principal: {other:?}"),
                })
                .collect::<Vec<_>>();
            (name.as_str(), names)
        })
        .collect::<Vec<_>>();
    principals.sort();
    assert_eq!(
        principals,
        [
            (
                "default/bookstore-access",
                vec![
                    "bookbuyer.default.svc.cluster.local".to_string(),
                    "bookthief.default.svc.cluster.local".to_string(),
                ]
            ),
            (
                "default/bookstore-audit",
                vec!["auditor.audit.svc.cluster.local".to_string()]
            ),
        ]
    );
}

#[test]
fn rbac_without_traffic_targets_denies_everything() {
    let mesh = mk_mesh();
    let chains = mk_builder(&mesh, false).build_inbound_filter_chains(&mk_svc("default", "bookbuyer"));
    let rbac = filter_config::<Rbac>(&chains[0].filters[0]);
    let rules = rbac.rules.expect("filter must have rules");
    assert_eq!(rules.action(), Action::Allow);
    assert!(rules.policies.is_empty());
}

#[test]
fn outbound_chain_matches_each_endpoint() {
    let mesh = mk_mesh();
    let chain = mk_builder(&mesh, false)
        .build_outbound_filter_chain(&mk_svc("default", "bookstore"))
        .expect("chain must build");

    assert_eq!(chain.name, "default/bookstore");
    assert_eq!(filter_names(&chain), ["envoy.filters.network.http_connection_manager"]);
    assert_eq!(chain.transport_socket, None);

    let m = chain.filter_chain_match.expect("chain must have a match");
    assert_eq!(m.application_protocols, ["http/1.0", "http/1.1", "h2c"]);
    assert_eq!(
        m.prefix_ranges,
        [prefix_range("10.0.0.1", 32), prefix_range("10.0.0.2", 32)]
    );

    let hcm = filter_config::<HttpConnectionManager>(&chain.filters[0]);
    assert_eq!(hcm.stat_prefix, "outbound.default/bookstore");
    assert_eq!(hcm_route_config(hcm), Some("RDS_Outbound".to_string()));
}

#[test]
fn outbound_chain_collapses_endpoints_sharing_an_address() {
    let mesh = mk_mesh();
    let backend = mk_svc("default", "backend");
    mesh.add_service(
        &backend,
        [
            ServiceEndpoint::new("fd00::1".parse::<std::net::IpAddr>().unwrap(), 8080),
            ServiceEndpoint::new("fd00::1".parse::<std::net::IpAddr>().unwrap(), 9090),
        ],
    );

    let chain = mk_builder(&mesh, false)
        .build_outbound_filter_chain(&backend)
        .expect("chain must build");
    assert_eq!(
        chain.filter_chain_match.unwrap().prefix_ranges,
        [prefix_range("fd00::1", 128)]
    );
}

#[test]
fn outbound_chain_without_endpoints_fails() {
    let mesh = mk_mesh();
    let empty = mk_svc("default", "empty");
    mesh.add_service(&empty, Vec::new());

    let err = mk_builder(&mesh, false)
        .build_outbound_filter_chain(&empty)
        .expect_err("chain must not build");
    assert!(
        matches!(&err, SynthesisError::NoEndpoints(svc) if *svc == empty),
        "unexpected error: {err}"
    );
}

#[test]
fn outbound_chain_for_unknown_service_fails() {
    let mesh = mk_mesh();
    let err = mk_builder(&mesh, false)
        .build_outbound_filter_chain(&mk_svc("default", "unknown"))
        .expect_err("chain must not build");
    assert!(
        matches!(err, SynthesisError::Resolve(ResolveError::NotFound(_))),
        "unexpected error: {err}"
    );
}

#[test]
fn listeners_skip_unbuildable_destinations() {
    let mesh = mk_mesh();
    let bookbuyer = mk_svc("default", "bookbuyer");
    let empty = mk_svc("default", "empty");
    mesh.add_service(&empty, Vec::new());
    mesh.spec.add(mk_target("empty-access", &bookbuyer, &empty));

    let metrics = SynthesisMetrics::default();
    let lds = ListenerSynthesizer::new(
        mesh.catalog(MeshConfig::default()),
        Encoder::default(),
        metrics.clone(),
    );
    let rsp = lds
        .synthesize(&Proxy {
            common_name: "bookbuyer.default".to_string(),
            service: bookbuyer,
        })
        .expect("synthesis must succeed");
    assert_eq!(rsp.type_url, "type.googleapis.com/envoy.config.listener.v3.Listener");
    assert_eq!(rsp.version, 1);
    assert_eq!(metrics.responses(metrics::LISTENERS), 1);

    let listeners = rsp
        .resources
        .iter()
        .map(|any| Listener::decode(any.value.as_slice()).expect("listener must decode"))
        .collect::<Vec<_>>();
    assert_eq!(listeners.len(), 2);

    let inbound = &listeners[0];
    assert_eq!(inbound.name, "inbound-listener");
    assert_eq!(inbound.traffic_direction(), TrafficDirection::Inbound);
    assert_eq!(inbound.address, Some(transport::socket_address("0.0.0.0", 15003)));
    assert_eq!(
        inbound
            .listener_filters
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>(),
        ["envoy.filters.listener.tls_inspector"]
    );

    let outbound = &listeners[1];
    assert_eq!(outbound.name, "outbound-listener");
    assert_eq!(outbound.traffic_direction(), TrafficDirection::Outbound);
    assert_eq!(outbound.address, Some(transport::socket_address("0.0.0.0", 15001)));
    assert_eq!(
        outbound
            .filter_chains
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>(),
        ["default/bookstore"]
    );
}

#[test]
fn listener_without_chains_is_omitted() {
    let mesh = mk_mesh();
    let lds = ListenerSynthesizer::new(
        mesh.catalog(MeshConfig::default()),
        Encoder::default(),
        SynthesisMetrics::default(),
    );
    let rsp = lds
        .synthesize(&Proxy {
            common_name: "bookstore.default".to_string(),
            service: mk_svc("default", "bookstore"),
        })
        .expect("synthesis must succeed");

    let names = rsp
        .resources
        .iter()
        .map(|any| Listener::decode(any.value.as_slice()).unwrap().name)
        .collect::<Vec<_>>();
    assert_eq!(names, ["inbound-listener"]);
}

#[test]
fn listener_encoding_failure_keeps_version() {
    let mesh = mk_mesh();
    let metrics = SynthesisMetrics::default();
    let lds = ListenerSynthesizer::new(
        mesh.catalog(MeshConfig::default()),
        Encoder::default(),
        metrics.clone(),
    );
    let proxy = Proxy {
        common_name: "bookbuyer.default".to_string(),
        service: mk_svc("default", "bookbuyer"),
    };
    let rsp = lds.synthesize(&proxy).expect("synthesis must succeed");
    assert_eq!(lds.version(), 1);

    // Every filter chain is smaller than the listener that contains it, so
    // only the largest listener exceeds the limit.
    let largest = rsp
        .resources
        .iter()
        .map(|any| any.value.len())
        .max()
        .expect("response must have listeners");
    let lds = ListenerSynthesizer {
        builder: ListenerBuilder::new(
            mesh.catalog(MeshConfig::default()),
            Encoder::new(largest - 1),
        ),
        versions: lds.versions,
        metrics: metrics.clone(),
    };
    let err = lds.synthesize(&proxy).expect_err("synthesis must fail");
    assert!(matches!(err, SynthesisError::Encode(_)), "{err}");
    assert_eq!(lds.version(), 1);
    assert_eq!(metrics.failures(metrics::LISTENERS), 1);
}
