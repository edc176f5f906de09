use kube::ResourceExt;
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::{collections::BTreeSet, sync::Arc};

/// Records how watch events change a shared index.
#[derive(Debug)]
pub struct IndexMetrics<T> {
    inner: T,
    size: Family<NamespaceLabels, Gauge>,
    applies: Family<NamespaceLabels, Counter>,
    deletes: Family<NamespaceLabels, Counter>,
    resets: Family<KindLabels, Counter>,
}

/// An index that can report how many resources of kind `R` it holds.
pub trait SizedIndex<R> {
    fn size(&self, namespace: &str) -> usize;
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct NamespaceLabels {
    kind: String,
    namespace: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

// === impl IndexMetrics ===

impl<T> IndexMetrics<T> {
    pub fn register(inner: T, reg: &mut Registry) -> Self {
        let size = Family::default();
        reg.register(
            "size",
            "Number of resources in the index, by namespace",
            size.clone(),
        );

        let applies = Family::default();
        reg.register(
            "applies",
            "Count of resource updates applied to the index",
            applies.clone(),
        );

        let deletes = Family::default();
        reg.register(
            "deletes",
            "Count of resource deletions applied to the index",
            deletes.clone(),
        );

        let resets = Family::default();
        reg.register(
            "resets",
            "Count of times the index was reset from a full listing",
            resets.clone(),
        );

        Self {
            inner,
            size,
            applies,
            deletes,
            resets,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }
}

impl<T> IndexMetrics<Arc<RwLock<T>>> {
    fn labels<R: ResourceExt<DynamicType = ()>>(namespace: String) -> NamespaceLabels {
        NamespaceLabels {
            kind: R::kind(&()).to_string(),
            namespace,
        }
    }

    fn record_size<R>(&self, labels: &NamespaceLabels)
    where
        T: SizedIndex<R>,
    {
        let size = self.inner.read().size(&labels.namespace);
        self.size
            .get_or_create(labels)
            .set(i64::try_from(size).unwrap_or(i64::MAX));
    }
}

impl<R, T> IndexNamespacedResource<R> for IndexMetrics<Arc<RwLock<T>>>
where
    T: SizedIndex<R> + IndexNamespacedResource<R>,
    R: ResourceExt<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        let labels = Self::labels::<R>(resource.namespace().unwrap_or_default());
        self.applies.get_or_create(&labels).inc();
        self.inner.write().apply(resource);
        self.record_size::<R>(&labels);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let labels = Self::labels::<R>(namespace.clone());
        self.deletes.get_or_create(&labels).inc();
        self.inner.write().delete(namespace, name);
        self.record_size::<R>(&labels);
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        let namespaces = resources
            .iter()
            .filter_map(|r| r.namespace())
            .chain(removed.keys().cloned())
            .collect::<BTreeSet<_>>();

        self.resets
            .get_or_create(&KindLabels {
                kind: R::kind(&()).to_string(),
            })
            .inc();
        self.inner.write().reset(resources, removed);
        for ns in namespaces {
            self.record_size::<R>(&Self::labels::<R>(ns));
        }
    }
}
