//! Explicit mapping from resource kind name to its families and watch source.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use kube::Resource;
use kubestate_core::{filter_families, ComposedGenerator, FamilyFilter, FamilyGenerator, LabelAllowlist, WatchStore};
use kubestate_kubehub::{Reflector, ReflectorConfig, ServedResource, SourceFactory};
use kubestate_store::{MetricsStore, NamespacedStore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::{BuildError, Collector};

/// Per-kind knobs handed to a family table.
#[derive(Debug, Clone, Default)]
pub struct FamilyOptions {
    /// Object label keys exposed on `kube_<kind>_labels` (`*` = all).
    pub labels: Vec<String>,
    /// Object annotation keys exposed on `kube_<kind>_annotations` (`*` = all).
    pub annotations: Vec<String>,
}

/// Everything one kind needs from the builder to assemble its collector.
pub(crate) struct BuildContext<'a> {
    pub namespaces: &'a [String],
    pub filter: &'a dyn FamilyFilter,
    pub field_selectors: &'a HashMap<String, String>,
    pub labels: &'a LabelAllowlist,
    pub annotations: &'a LabelAllowlist,
    pub reflector: &'a ReflectorConfig,
    pub cancel: &'a CancellationToken,
    pub tracker: &'a TaskTracker,
}

pub(crate) trait KindBuilder: Send + Sync {
    /// Apiserver resource this kind is listed and watched from.
    fn served_as(&self) -> &ServedResource;
    fn build(&self, resource: &str, ctx: &BuildContext<'_>) -> Result<Collector, BuildError>;
}

type FamiliesFn<K> = dyn Fn(&FamilyOptions) -> Vec<FamilyGenerator<K>> + Send + Sync;

struct KindEntry<K> {
    served_as: ServedResource,
    families: Box<FamiliesFn<K>>,
    source: Arc<dyn SourceFactory<K>>,
}

impl<K> KindBuilder for KindEntry<K>
where
    K: Resource + Send + Sync + 'static,
{
    fn served_as(&self) -> &ServedResource {
        &self.served_as
    }

    fn build(&self, resource: &str, ctx: &BuildContext<'_>) -> Result<Collector, BuildError> {
        let opts = FamilyOptions { labels: ctx.labels.for_kind(resource), annotations: ctx.annotations.for_kind(resource) };
        let families = filter_families(ctx.filter, (self.families)(&opts));
        let composed = ComposedGenerator::compose(families)?;
        debug!(resource, families = composed.len(), "composed metric families");
        let store = Arc::new(MetricsStore::new(resource, composed));

        let namespaces = if self.source.cluster_scoped() || ctx.namespaces.is_empty() {
            vec![String::new()]
        } else {
            ctx.namespaces.to_vec()
        };
        let field_selector = ctx.field_selectors.get(resource).map(String::as_str);
        for ns in namespaces {
            let source = self.source.create(&ns, field_selector);
            let sink: Arc<dyn WatchStore<K>> = Arc::new(NamespacedStore::new(Arc::clone(&store), ns.clone()));
            let reflector = Reflector::new(resource, ns, source, sink).with_config(ctx.reflector.clone());
            ctx.tracker.spawn(reflector.run(ctx.cancel.child_token()));
        }
        Ok(Collector::new(store))
    }
}

/// Known resource kinds. Builders only construct collectors for kinds found here.
#[derive(Default)]
pub struct Registry {
    kinds: BTreeMap<String, Box<dyn KindBuilder>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register kind `name`; a later registration under the same name wins.
    pub fn register<K, F, S>(&mut self, name: impl Into<String>, families: F, source: S)
    where
        K: Resource + Send + Sync + 'static,
        K::DynamicType: Default,
        F: Fn(&FamilyOptions) -> Vec<FamilyGenerator<K>> + Send + Sync + 'static,
        S: SourceFactory<K> + 'static,
    {
        let entry = KindEntry { served_as: ServedResource::of::<K>(), families: Box::new(families), source: Arc::new(source) };
        self.kinds.insert(name.into(), Box::new(entry));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Registered kind names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.kinds.keys().cloned().collect()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&dyn KindBuilder> {
        self.kinds.get(name).map(|k| k.as_ref())
    }
}
