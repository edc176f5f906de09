use crate::{
    catalog::{EventTopic, ReconcileEvent},
    core::Proxy,
    xds::{ClusterSynthesizer, DiscoveryResponse, ListenerSynthesizer},
};
use ahash::AHashMap as HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

/// Recomputes the configuration of every registered proxy whenever a
/// reconcile event is published.
#[derive(Clone, Debug)]
pub struct ProxyBroadcaster {
    proxies: Arc<Mutex<HashMap<String, Registration>>>,
    cds: Arc<ClusterSynthesizer>,
    lds: Arc<ListenerSynthesizer>,
}

/// The latest configuration synthesized for a proxy. A resource kind that
/// fails to synthesize keeps its previous response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProxyConfig {
    pub clusters: Option<DiscoveryResponse>,
    pub listeners: Option<DiscoveryResponse>,
}

#[derive(Debug)]
struct Registration {
    proxy: Proxy,
    tx: watch::Sender<ProxyConfig>,
}

// === impl ProxyBroadcaster ===

impl ProxyBroadcaster {
    pub fn new(cds: ClusterSynthesizer, lds: ListenerSynthesizer) -> Self {
        Self {
            proxies: Default::default(),
            cds: Arc::new(cds),
            lds: Arc::new(lds),
        }
    }

    /// Registers a proxy, returning a watch of its configuration.
    ///
    /// The configuration is synthesized immediately. A proxy registering with
    /// the common name of an existing registration replaces it, closing the
    /// prior watch. A registration is dropped once all its receivers are.
    pub fn register(&self, proxy: Proxy) -> watch::Receiver<ProxyConfig> {
        let (tx, rx) = watch::channel(ProxyConfig::default());
        self.update(&proxy, &tx);
        info!(%proxy, service = %proxy.service, "Registered proxy");
        self.proxies
            .lock()
            .insert(proxy.common_name.clone(), Registration { proxy, tx });
        rx
    }

    pub fn registered(&self) -> usize {
        self.proxies.lock().len()
    }

    /// Broadcasts on every event until `drain` is signaled.
    ///
    /// When the receiver lags, the skipped events are collapsed into a single
    /// broadcast since every event asks for the same recomputation.
    pub async fn run(self, mut events: broadcast::Receiver<ReconcileEvent>, drain: drain::Watch) {
        tokio::pin! {
            let shutdown = drain.signaled();
        }

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(ReconcileEvent { topic: EventTopic::ProxyBroadcast, source }) => {
                        debug!(%source, "Broadcasting proxy configuration");
                        self.broadcast();
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Lagged behind reconcile events");
                        self.broadcast();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Event bus closed");
                        drop((&mut shutdown).await);
                        return;
                    }
                },

                release = &mut shutdown => {
                    debug!("Shutting down");
                    drop(release);
                    return;
                }
            }
        }
    }

    /// Synthesizes and publishes configuration for every registered proxy,
    /// forgetting proxies that are no longer watched.
    pub fn broadcast(&self) {
        let mut proxies = self.proxies.lock();
        proxies.retain(|_, Registration { proxy, tx }| {
            if tx.is_closed() {
                info!(%proxy, "Proxy deregistered");
                return false;
            }
            self.update(proxy, tx);
            true
        });
        debug!(proxies = proxies.len(), "Broadcast proxy configuration");
    }

    fn update(&self, proxy: &Proxy, tx: &watch::Sender<ProxyConfig>) {
        // Failures are logged by the synthesizers.
        let clusters = self.cds.synthesize(proxy).ok();
        let listeners = self.lds.synthesize(proxy).ok();
        if clusters.is_none() && listeners.is_none() {
            return;
        }

        tx.send_modify(|config| {
            if let Some(clusters) = clusters {
                config.clusters = Some(clusters);
            }
            if let Some(listeners) = listeners {
                config.listeners = Some(listeners);
            }
        });
    }
}
