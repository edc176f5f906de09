use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct SynthesisMetrics {
    responses: Family<KindLabels, Counter>,
    failures: Family<KindLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: &'static str,
}

pub(crate) const CLUSTERS: &str = "clusters";
pub(crate) const LISTENERS: &str = "listeners";

// === impl SynthesisMetrics ===

impl SynthesisMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let responses = Family::default();
        reg.register(
            "responses",
            "Count of discovery responses synthesized, by resource kind",
            responses.clone(),
        );

        let failures = Family::default();
        reg.register(
            "failures",
            "Count of synthesis passes that failed, by resource kind",
            failures.clone(),
        );

        Self {
            responses,
            failures,
        }
    }

    pub(crate) fn responded(&self, kind: &'static str) {
        self.responses.get_or_create(&KindLabels { kind }).inc();
    }

    pub(crate) fn failed(&self, kind: &'static str) {
        self.failures.get_or_create(&KindLabels { kind }).inc();
    }

    #[cfg(test)]
    pub(crate) fn failures(&self, kind: &'static str) -> u64 {
        self.failures.get_or_create(&KindLabels { kind }).get()
    }

    #[cfg(test)]
    pub(crate) fn responses(&self, kind: &'static str) -> u64 {
        self.responses.get_or_create(&KindLabels { kind }).get()
    }
}
