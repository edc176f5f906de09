use mesh_controller_core::AnnouncementKind;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct DispatchMetrics {
    events: Family<SourceLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SourceLabels {
    source: &'static str,
}

// === impl DispatchMetrics ===

impl DispatchMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let events = Family::default();
        reg.register(
            "events",
            "Count of reconcile events published, by the kind of collaborator that triggered them",
            events.clone(),
        );
        Self { events }
    }

    pub(crate) fn published(&self, source: AnnouncementKind) {
        self.events
            .get_or_create(&SourceLabels {
                source: source.as_str(),
            })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn get(&self, source: AnnouncementKind) -> u64 {
        self.events
            .get_or_create(&SourceLabels {
                source: source.as_str(),
            })
            .get()
    }
}
