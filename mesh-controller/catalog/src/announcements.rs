use crate::MeshCatalog;
use futures::prelude::*;
use mesh_controller_core::{Announcement, AnnouncementStream};
use std::{fmt, sync::Arc, time::Duration};
use tokio::time;

/// A named source of announcements.
///
/// The name only identifies the source in diagnostics.
pub struct AnnouncementChannel {
    pub name: Arc<str>,
    pub announcements: AnnouncementStream,
}

// === impl AnnouncementChannel ===

impl AnnouncementChannel {
    pub fn new(name: impl Into<Arc<str>>, announcements: AnnouncementStream) -> Self {
        Self {
            name: name.into(),
            announcements,
        }
    }
}

impl fmt::Debug for AnnouncementChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnouncementChannel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// === impl MeshCatalog ===

impl MeshCatalog {
    /// Lists a channel for each collaborator, one per endpoint provider, and,
    /// when a minimum refresh interval is configured, a ticker.
    ///
    /// Streams are not polled here; no notification is consumed until the
    /// channels are handed to a [`Dispatcher`](crate::Dispatcher).
    pub fn announcement_channels(&self) -> Vec<AnnouncementChannel> {
        let mut channels = vec![
            AnnouncementChannel::new("Services", self.topology.announcements()),
            AnnouncementChannel::new("MeshSpec", self.mesh_spec.announcements()),
            AnnouncementChannel::new("CertManager", self.cert_manager.announcements()),
            AnnouncementChannel::new("IngressMonitor", self.ingress_monitor.announcements()),
        ];

        for provider in self.endpoint_providers.iter() {
            channels.push(AnnouncementChannel::new(
                provider.id(),
                provider.announcements(),
            ));
        }

        let period = self.config.min_refresh_interval;
        if !period.is_zero() {
            channels.push(AnnouncementChannel::new("Ticker", ticker(period)));
        }

        channels
    }
}

/// Emits a tick every `period`, starting one period after the stream is first
/// polled.
fn ticker(period: Duration) -> AnnouncementStream {
    Box::pin(stream::unfold(None, move |interval: Option<time::Interval>| async move {
        let mut interval = interval.unwrap_or_else(|| {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
        Some((Announcement::Tick, Some(interval)))
    }))
}
