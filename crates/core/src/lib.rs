//! kubestate core types: metric model, generator composition, allow/deny
//! filtering and the store contract reflectors write into.

#![forbid(unsafe_code)]

use std::fmt;

use kube::Resource;
use serde::{Deserialize, Serialize};

pub mod filter;
pub mod generator;
pub mod labels;
pub mod metric;

pub use filter::{AllowDenyList, FamilyFilter, UnlistedPolicy};
pub use generator::{filter_families, ComposedGenerator, FamilyGenerator, RenderedFamily};
pub use labels::{allowed_label_pairs, sanitize_label_name, LabelAllowlist};
pub use metric::{Family, FamilyHeader, LabelList, Metric, MetricType};

pub mod prelude {
    pub use super::{
        ComposedGenerator, Family, FamilyGenerator, Metric, MetricType, ObjectKey, RenderError, WatchStore,
    };
}

/// Construction-time configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate metric family: {0}")]
    DuplicateFamily(String),
    #[error("invalid family pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid label allowlist: {0}")]
    InvalidLabelAllowlist(String),
}

/// A generator could not render one object. Recoverable; scoped to one family.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("object has no {0}")]
    MissingField(&'static str),
    #[error("family {family}: {keys} label keys but {values} label values")]
    LabelMismatch { family: String, keys: usize, values: usize },
    #[error("family {family}: label {label} appears more than once")]
    DuplicateLabel { family: String, label: String },
}

/// Identity of an object within one resource kind: `(namespace, name)`.
/// Cluster-scoped objects have an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        let meta = obj.meta();
        Self {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    /// Whether this key falls inside `namespace`; the empty namespace covers all.
    pub fn in_namespace(&self, namespace: &str) -> bool {
        namespace.is_empty() || self.namespace == namespace
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Cache consumer fed by a reflector: the list/watch store contract.
pub trait WatchStore<K>: Send + Sync {
    fn add(&self, obj: &K);
    fn update(&self, obj: &K);
    /// Removing an absent object is a no-op.
    fn delete(&self, obj: &K);
    /// Reconcile with a full listing: the store ends up holding exactly `objs`.
    fn replace(&self, objs: &[K]);
}
