use crate::{AnnouncementChannel, DispatchMetrics, EventBus, ReconcileEvent};
use futures::{prelude::*, stream::SelectAll};
use mesh_controller_core::Announcement;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Republishes every announcement as a [`ReconcileEvent`].
#[derive(Debug)]
pub struct Dispatcher {
    channels: Vec<AnnouncementChannel>,
    bus: EventBus,
    metrics: DispatchMetrics,
}

type Sources = SelectAll<stream::BoxStream<'static, (Arc<str>, Announcement)>>;

// === impl Dispatcher ===

impl Dispatcher {
    pub fn new(channels: Vec<AnnouncementChannel>, bus: EventBus, metrics: DispatchMetrics) -> Self {
        Self {
            channels,
            bus,
            metrics,
        }
    }

    /// Waits on all channels until `drain` is signaled, publishing one event
    /// per announcement in the order announcements are observed.
    ///
    /// Channels that close are dropped from the wait set. Shutdown is raced
    /// fairly against announcements, so no announcement is guaranteed to be
    /// published once shutdown has been signaled.
    pub async fn run(self, drain: drain::Watch) {
        let Self {
            channels,
            bus,
            metrics,
        } = self;

        let names = channels
            .iter()
            .map(|ch| ch.name.to_string())
            .collect::<Vec<_>>();
        info!(channels = ?names, "Dispatching announcements");

        let mut sources: Sources = stream::select_all(channels.into_iter().map(
            |AnnouncementChannel {
                 name,
                 announcements,
             }| {
                announcements
                    .map(move |announcement| (name.clone(), announcement))
                    .boxed()
            },
        ));

        tokio::pin! {
            let shutdown = drain.signaled();
        }

        loop {
            tokio::select! {
                next = sources.next(), if !sources.is_empty() => match next {
                    Some((source, announcement)) => {
                        trace!(%source, ?announcement);
                        let kind = announcement.kind();
                        let receivers = bus.publish(ReconcileEvent::proxy_broadcast(kind));
                        metrics.published(kind);
                        debug!(%source, %kind, receivers, "Published reconcile event");
                    }
                    None => debug!("All announcement channels closed"),
                },

                release = &mut shutdown => {
                    debug!("Shutting down");
                    drop(release);
                    return;
                }
            }
        }
    }
}
