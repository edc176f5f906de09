//! End-to-end synthesis over an in-memory mesh.

use crate::{ClusterSynthesizer, ListenerSynthesizer, Settings, SynthesisMetrics};
use envoy_types::pb::{
    envoy::config::{cluster::v3::Cluster, core::v3::CidrRange},
    google::protobuf::UInt32Value,
};
use mesh_controller_catalog::testing::{mk_svc, mk_target, Mesh};
use mesh_controller_core::{MeshConfig, Proxy, ServiceEndpoint};
use pretty_assertions::assert_eq;
use prost::Message;
use std::net::Ipv4Addr;

#[test]
fn bookstore() {
    let _tracing = tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    );

    let mesh = Mesh::with_providers(["kubernetes"]);
    let bookbuyer = mk_svc("", "bookbuyer");
    let bookstore = mk_svc("", "bookstore");
    mesh.add_service(&bookbuyer, Vec::new());
    mesh.add_service(&bookstore, [ServiceEndpoint::new(Ipv4Addr::new(10, 0, 0, 5), 80)]);
    mesh.spec.add(mk_target("bookstore", &bookbuyer, &bookstore));

    let catalog = mesh.catalog(MeshConfig::default());
    let settings = Settings::default();
    let metrics = SynthesisMetrics::default();
    let cds = ClusterSynthesizer::new(catalog.clone(), settings.clone(), metrics.clone());
    let lds = ListenerSynthesizer::new(catalog, settings.encoder, metrics);

    let chain = lds
        .builder()
        .build_outbound_filter_chain(&bookstore)
        .expect("bookstore must have an outbound chain");
    assert_eq!(chain.name, "bookstore");
    assert_eq!(chain.filters.len(), 1);
    assert_eq!(
        chain.filter_chain_match.map(|m| m.prefix_ranges),
        Some(vec![CidrRange {
            address_prefix: "10.0.0.5".to_string(),
            prefix_len: Some(UInt32Value { value: 32 }),
        }])
    );

    let proxy = Proxy {
        common_name: "bookbuyer".to_string(),
        service: bookbuyer,
    };
    let mut nonces = Vec::new();
    for _ in 0..2 {
        let prior = cds.version();
        let rsp = cds.synthesize(&proxy).expect("clusters must synthesize");
        assert_eq!(rsp.version, prior + 1);
        assert!(!nonces.contains(&rsp.nonce), "nonce must be fresh");
        nonces.push(rsp.nonce.clone());

        let clusters = rsp
            .resources
            .iter()
            .map(|any| Cluster::decode(any.value.as_slice()).expect("cluster must decode"))
            .collect::<Vec<_>>();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].name, "bookstore");

        let proto = rsp.into_proto();
        assert_eq!(proto.version_info, format!("v{}", prior + 1));
        assert_eq!(proto.nonce, nonces[nonces.len() - 1]);
    }
}
