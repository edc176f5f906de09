use crate::{
    catalog::{DispatchMetrics, Dispatcher, EventBus, MeshCatalog},
    core::{EndpointProvider, MeshConfig, MeshService, Proxy, SdsConfig},
    index::{
        EndpointIndex, IndexMetrics, IngressIndex, Ingresses, KubernetesEndpoints, ServiceIndex,
        Topology, TrafficTargetIndex, TrafficTargets,
    },
    k8s, xds, ProxyBroadcaster, ProxyConfig, StaticCertManager,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::{runtime::watcher, Client, Resource};
use prometheus_client::registry::Registry;
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "mesh-controller", about = "A service mesh control plane")]
pub struct Args {
    #[clap(
        long,
        default_value = "mesh_controller=info,warn",
        env = "MESH_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Allows all in-mesh traffic, ignoring traffic targets.
    #[clap(long)]
    permissive_traffic_policy_mode: bool,

    /// Recomputes proxy configuration at least this often. Zero disables
    /// periodic recomputation.
    #[clap(long, default_value = "0")]
    min_refresh_interval_ms: u64,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    /// The bootstrap cluster through which proxies reach the secret discovery
    /// service.
    #[clap(long, default_value = "sds")]
    sds_cluster_name: String,

    /// The bootstrap cluster through which proxies reach the endpoint
    /// discovery service.
    #[clap(long, default_value = "eds")]
    eds_cluster_name: String,

    #[clap(long, default_value = "service-cert")]
    service_cert_secret: String,

    #[clap(long, default_value = "root-cert")]
    root_cert_secret: String,

    /// Discovery responses whose resources encode larger than this are
    /// rejected.
    #[clap(long, default_value = "4194304")]
    max_resource_bytes: usize,

    /// Registers a proxy, as `<common-name>=<namespace>/<service>`, whose
    /// configuration is synthesized and logged on every change.
    #[clap(long = "proxy")]
    proxies: Vec<StaticProxy>,
}

#[derive(Clone, Debug)]
struct StaticProxy(Proxy);

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            permissive_traffic_policy_mode,
            min_refresh_interval_ms,
            cluster_domain,
            sds_cluster_name,
            eds_cluster_name,
            service_cert_secret,
            root_cert_secret,
            max_resource_bytes,
            proxies,
        } = self;

        let mut prom = <Registry>::default();
        let dispatch_metrics =
            DispatchMetrics::register(prom.sub_registry_with_prefix("dispatch"));
        let synthesis_metrics =
            xds::SynthesisMetrics::register(prom.sub_registry_with_prefix("synthesis"));

        // Wrap each index with metrics. The inner handles are retained so
        // that collaborators can read from them.
        let index_reg = prom.sub_registry_with_prefix("index");
        let services = ServiceIndex::shared();
        let services_metrics = IndexMetrics::register(
            services.clone(),
            index_reg.sub_registry_with_prefix("services"),
        )
        .shared();
        let endpoints = EndpointIndex::shared();
        let endpoints_metrics = IndexMetrics::register(
            endpoints.clone(),
            index_reg.sub_registry_with_prefix("endpoints"),
        )
        .shared();
        let traffic_targets = TrafficTargetIndex::shared();
        let traffic_targets_metrics = IndexMetrics::register(
            traffic_targets.clone(),
            index_reg.sub_registry_with_prefix("traffictargets"),
        )
        .shared();
        let ingresses = IngressIndex::shared();
        let ingresses_metrics = IndexMetrics::register(
            ingresses.clone(),
            index_reg.sub_registry_with_prefix("ingresses"),
        )
        .shared();

        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Spawn resource watches.

        let svcs = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(services_metrics, svcs).instrument(info_span!("services")),
        );

        let slices = runtime.watch_all::<k8s::EndpointSlice>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(endpoints_metrics, slices)
                .instrument(info_span!("endpointslices")),
        );

        let ingress_watch = runtime.watch_all::<k8s::Ingress>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(ingresses_metrics, ingress_watch)
                .instrument(info_span!("ingresses")),
        );

        if api_resource_exists::<k8s::TrafficTarget>(&runtime.client()).await {
            let targets = runtime.watch_all::<k8s::TrafficTarget>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(traffic_targets_metrics, targets)
                    .instrument(info_span!("traffictargets.access.smi-spec.io")),
            );
        } else {
            tracing::warn!(
                "traffictargets.access.smi-spec.io resource kind not found, skipping watches"
            );
        }

        let catalog = MeshCatalog::new(
            Arc::new(Topology::new(services)),
            Arc::new(TrafficTargets::new(traffic_targets)),
            Arc::new(StaticCertManager::new(SdsConfig {
                cluster_name: sds_cluster_name,
                cert_secret_name: service_cert_secret,
                validation_secret_name: root_cert_secret,
            })),
            Arc::new(Ingresses::new(ingresses)),
            vec![Arc::new(KubernetesEndpoints::new(endpoints)) as Arc<dyn EndpointProvider>],
            MeshConfig {
                permissive_traffic_policy_mode,
                min_refresh_interval: Duration::from_millis(min_refresh_interval_ms),
                cluster_domain,
            },
        )?;

        // Subscribe before the dispatcher starts so that no event is missed.
        let bus = EventBus::default();
        let events = bus.subscribe();
        let dispatcher = Dispatcher::new(catalog.announcement_channels(), bus, dispatch_metrics);
        tokio::spawn(
            dispatcher
                .run(runtime.shutdown_handle())
                .instrument(info_span!("dispatcher")),
        );

        let encoder = xds::Encoder::new(max_resource_bytes);
        let broadcaster = ProxyBroadcaster::new(
            xds::ClusterSynthesizer::new(
                catalog.clone(),
                xds::Settings {
                    eds_cluster_name,
                    encoder,
                },
                synthesis_metrics.clone(),
            ),
            xds::ListenerSynthesizer::new(catalog, encoder, synthesis_metrics),
        );

        for StaticProxy(proxy) in proxies {
            let span = info_span!("proxy", cn = %proxy.common_name);
            let rx = broadcaster.register(proxy);
            tokio::spawn(log_updates(rx).instrument(span));
        }

        tokio::spawn(
            broadcaster
                .run(events, runtime.shutdown_handle())
                .instrument(info_span!("broadcaster")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait
        // for the background tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

// === impl StaticProxy ===

impl FromStr for StaticProxy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (common_name, service) = s
            .split_once('=')
            .context("proxy must be formatted as <common-name>=<namespace>/<service>")?;
        if common_name.is_empty() {
            bail!("proxy common name must not be empty");
        }
        let (ns, name) = service
            .split_once('/')
            .context("proxy service must be formatted as <namespace>/<service>")?;
        let service = MeshService::new(ns, name)?;
        Ok(Self(Proxy {
            common_name: common_name.to_string(),
            service,
        }))
    }
}

async fn log_updates(mut rx: watch::Receiver<ProxyConfig>) {
    loop {
        {
            let config = rx.borrow_and_update();
            let clusters = config.clusters.as_ref();
            let listeners = config.listeners.as_ref();
            info!(
                clusters.version = clusters.map(|r| r.version),
                clusters.resources = clusters.map(|r| r.resources.len()),
                listeners.version = listeners.map(|r| r.version),
                listeners.resources = listeners.map(|r| r.resources.len()),
                "Proxy configuration updated"
            );
        }

        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
