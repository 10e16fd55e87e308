//! Builder assembling collectors and their reflectors from a registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kubestate_core::{FamilyFilter, LabelAllowlist};
use kubestate_kubehub::{ReflectorConfig, ServedResource};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::registry::{BuildContext, Registry};
use crate::{BuildError, Collector};

pub struct Builder {
    registry: Registry,
    enabled: Vec<String>,
    namespaces: Vec<String>,
    filter: Option<Arc<dyn FamilyFilter>>,
    served: Option<HashSet<ServedResource>>,
    field_selectors: HashMap<String, String>,
    labels: LabelAllowlist,
    annotations: LabelAllowlist,
    reflector: ReflectorConfig,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Builder {
    /// Reflectors spawned by `build` stop when `cancel` fires.
    pub fn new(registry: Registry, cancel: CancellationToken) -> Self {
        Self {
            registry,
            enabled: Vec::new(),
            namespaces: Vec::new(),
            filter: None,
            served: None,
            field_selectors: HashMap::new(),
            labels: LabelAllowlist::default(),
            annotations: LabelAllowlist::default(),
            reflector: ReflectorConfig::default(),
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    /// Kinds to build, deduplicated and sorted. Empty means every registered kind.
    pub fn with_enabled_resources<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kinds: Vec<String> = kinds.into_iter().map(Into::into).filter(|k| !k.is_empty()).collect();
        kinds.sort();
        kinds.dedup();
        self.enabled = kinds;
        self
    }

    /// Namespaces to watch, deduplicated and sorted. Empty means all namespaces.
    pub fn with_namespaces(mut self, namespaces: Vec<String>) -> Self {
        let mut namespaces: Vec<String> = namespaces.into_iter().filter(|n| !n.is_empty()).collect();
        namespaces.sort();
        namespaces.dedup();
        self.namespaces = namespaces;
        self
    }

    /// Resources the apiserver serves. Kinds outside this set are skipped;
    /// without it every registered kind is assumed to be served.
    pub fn with_served_resources<I>(mut self, served: I) -> Self
    where
        I: IntoIterator<Item = ServedResource>,
    {
        self.served = Some(served.into_iter().collect());
        self
    }

    pub fn with_family_filter(mut self, filter: Arc<dyn FamilyFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_field_selector(mut self, resource: impl Into<String>, selector: impl Into<String>) -> Self {
        self.field_selectors.insert(resource.into(), selector.into());
        self
    }

    pub fn with_labels_allowlist(mut self, list: LabelAllowlist) -> Self {
        self.labels = list;
        self
    }

    pub fn with_annotations_allowlist(mut self, list: LabelAllowlist) -> Self {
        self.annotations = list;
        self
    }

    pub fn with_reflector_config(mut self, config: ReflectorConfig) -> Self {
        self.reflector = config;
        self
    }

    /// Track reflector tasks on a caller-owned tracker (for shutdown waits).
    pub fn with_task_tracker(mut self, tracker: TaskTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn task_tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Build a collector per enabled, known kind and start its reflectors.
    /// Must run inside a tokio runtime. Unknown kinds, and kinds the apiserver
    /// does not serve, are logged and skipped.
    pub fn build(&self) -> Result<Vec<Collector>, BuildError> {
        let filter = self.filter.as_deref().ok_or(BuildError::MissingFilter)?;
        let enabled = if self.enabled.is_empty() {
            info!("using default resources");
            self.registry.names()
        } else {
            self.enabled.clone()
        };

        let ctx = BuildContext {
            namespaces: &self.namespaces,
            filter,
            field_selectors: &self.field_selectors,
            labels: &self.labels,
            annotations: &self.annotations,
            reflector: &self.reflector,
            cancel: &self.cancel,
            tracker: &self.tracker,
        };

        let mut collectors = Vec::with_capacity(enabled.len());
        let mut active = Vec::with_capacity(enabled.len());
        for kind in &enabled {
            match self.registry.get(kind) {
                Some(entry) if self.served.as_ref().is_some_and(|s| !s.contains(entry.served_as())) => {
                    warn!(resource = %kind, api = %entry.served_as(), "resource not served by the apiserver; skipping");
                }
                Some(entry) => {
                    collectors.push(entry.build(kind, &ctx)?);
                    active.push(kind.as_str());
                }
                None => warn!(resource = %kind, "unknown resource; skipping"),
            }
        }
        info!(active = %active.join(","), "active collectors");
        Ok(collectors)
    }
}
