//! Which resources the apiserver actually serves.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::{Context, Result};
use kube::discovery::Discovery;
use kube::{Client, Resource};
use tracing::debug;

/// Group, version and plural name of a served resource, e.g. `policy/v1/poddisruptionbudgets`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServedResource {
    pub group: String,
    pub version: String,
    pub plural: String,
}

impl ServedResource {
    pub fn new(group: impl Into<String>, version: impl Into<String>, plural: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), plural: plural.into() }
    }

    /// The resource a statically typed kind is read from.
    pub fn of<K>() -> Self
    where
        K: Resource,
        K::DynamicType: Default,
    {
        let dt = K::DynamicType::default();
        Self::new(K::group(&dt), K::version(&dt), K::plural(&dt))
    }
}

impl fmt::Display for ServedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.plural)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.plural)
        }
    }
}

/// Every group/version/resource the apiserver advertises.
pub async fn served_resources(client: Client) -> Result<BTreeSet<ServedResource>> {
    let discovery = Discovery::new(client).run().await.context("discovering served resources")?;
    let mut out = BTreeSet::new();
    for group in discovery.groups() {
        for version in group.versions() {
            for (ar, _caps) in group.versioned_resources(version) {
                out.insert(ServedResource::new(ar.group, ar.version, ar.plural));
            }
        }
    }
    debug!(count = out.len(), "discovered served resources");
    Ok(out)
}
