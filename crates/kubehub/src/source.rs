//! List+watch sources for one resource kind in one namespace.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, WatchParams};
use kube::core::WatchEvent;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;

/// Server-side watch timeout; the apiserver caps it just under 300s.
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 290;
/// Largest watch timeout the apiserver accepts (it must stay under 295s).
pub const MAX_WATCH_TIMEOUT_SECS: u32 = 294;

/// Keep a configured watch timeout inside `1..=MAX_WATCH_TIMEOUT_SECS`.
pub fn clamp_watch_timeout(secs: u32) -> u32 {
    secs.clamp(1, MAX_WATCH_TIMEOUT_SECS)
}

/// Result of a full listing.
#[derive(Debug, Clone)]
pub struct ListResult<K> {
    pub items: Vec<K>,
    pub resource_version: String,
}

pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>>>;

/// The initial listing call plus the incremental watch call for one kind.
#[async_trait::async_trait]
pub trait ListerWatcher<K>: Send + Sync {
    async fn list(&self) -> Result<ListResult<K>>;
    async fn watch(&self, resource_version: &str) -> Result<WatchStream<K>>;
}

/// Builds sources for one kind, one per namespace.
pub trait SourceFactory<K>: Send + Sync {
    /// Cluster-scoped kinds get a single source regardless of namespaces.
    fn cluster_scoped(&self) -> bool;
    fn create(&self, namespace: &str, field_selector: Option<&str>) -> Arc<dyn ListerWatcher<K>>;
}

/// `ListerWatcher` backed by the apiserver through kube-rs.
pub struct KubeListerWatcher<K> {
    api: Api<K>,
    field_selector: Option<String>,
    watch_timeout_secs: u32,
}

impl<K> KubeListerWatcher<K> {
    pub fn new(api: Api<K>, field_selector: Option<String>) -> Self {
        Self { api, field_selector, watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS }
    }

    pub fn with_watch_timeout(mut self, secs: u32) -> Self {
        self.watch_timeout_secs = clamp_watch_timeout(secs);
        self
    }
}

#[async_trait::async_trait]
impl<K> ListerWatcher<K> for KubeListerWatcher<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn list(&self) -> Result<ListResult<K>> {
        let mut lp = ListParams::default();
        if let Some(fs) = self.field_selector.as_deref() {
            lp = lp.fields(fs);
        }
        let list = self.api.list(&lp).await.context("listing objects")?;
        Ok(ListResult { resource_version: list.metadata.resource_version.unwrap_or_default(), items: list.items })
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream<K>> {
        let mut wp = WatchParams::default().timeout(self.watch_timeout_secs);
        if let Some(fs) = self.field_selector.as_deref() {
            wp = wp.fields(fs);
        }
        let stream = self.api.watch(&wp, resource_version).await.context("starting watch")?;
        Ok(stream.map_err(anyhow::Error::from).boxed())
    }
}

/// Factory producing `KubeListerWatcher`s from a shared client.
pub struct KubeSourceFactory<K> {
    client: Client,
    cluster_scoped: bool,
    make_api: fn(Client, &str) -> Api<K>,
    watch_timeout_secs: u32,
    _kind: PhantomData<fn() -> K>,
}

fn namespaced_api<K>(client: Client, namespace: &str) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    if namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, namespace)
    }
}

fn cluster_api<K>(client: Client, _namespace: &str) -> Api<K>
where
    K: Resource,
    K::DynamicType: Default,
{
    Api::all(client)
}

impl<K> KubeSourceFactory<K>
where
    K: Resource,
    K::DynamicType: Default,
{
    pub fn namespaced(client: Client) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        Self {
            client,
            cluster_scoped: false,
            make_api: namespaced_api::<K>,
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
            _kind: PhantomData,
        }
    }

    pub fn cluster(client: Client) -> Self {
        Self {
            client,
            cluster_scoped: true,
            make_api: cluster_api::<K>,
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
            _kind: PhantomData,
        }
    }

    pub fn with_watch_timeout(mut self, secs: u32) -> Self {
        self.watch_timeout_secs = clamp_watch_timeout(secs);
        self
    }
}

impl<K> SourceFactory<K> for KubeSourceFactory<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn cluster_scoped(&self) -> bool {
        self.cluster_scoped
    }

    fn create(&self, namespace: &str, field_selector: Option<&str>) -> Arc<dyn ListerWatcher<K>> {
        let api = (self.make_api)(self.client.clone(), namespace);
        Arc::new(KubeListerWatcher::new(api, field_selector.map(str::to_string)).with_watch_timeout(self.watch_timeout_secs))
    }
}
