//! Reflector: drives one list+watch source into one store until cancelled.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use kube::core::WatchEvent;
use kube::Resource;
use kubestate_core::WatchStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::source::ListerWatcher;

#[derive(Debug, Clone)]
pub struct ReflectorConfig {
    /// First delay after a failed list or watch; doubles up to `max_backoff`.
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self { min_backoff: Duration::from_millis(500), max_backoff: Duration::from_secs(30) }
    }
}

enum WatchEnd {
    Cancelled,
    /// Stream ended cleanly or the server asked for a relist.
    Closed,
    Failed(anyhow::Error),
}

pub struct Reflector<K> {
    resource: String,
    namespace: String,
    source: Arc<dyn ListerWatcher<K>>,
    store: Arc<dyn WatchStore<K>>,
    config: ReflectorConfig,
}

impl<K> Reflector<K>
where
    K: Resource + Send + Sync + 'static,
{
    pub fn new(
        resource: impl Into<String>,
        namespace: impl Into<String>,
        source: Arc<dyn ListerWatcher<K>>,
        store: Arc<dyn WatchStore<K>>,
    ) -> Self {
        Self { resource: resource.into(), namespace: namespace.into(), source, store, config: ReflectorConfig::default() }
    }

    pub fn with_config(mut self, config: ReflectorConfig) -> Self {
        self.config = config;
        self
    }

    /// List, replace, then watch; on any stream end relist from scratch.
    /// Returns once `cancel` fires; no store write happens after that.
    pub async fn run(self, cancel: CancellationToken) {
        info!(resource = %self.resource, ns = %self.namespace, "reflector started");
        let mut backoff = self.config.min_backoff;
        loop {
            let listed = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = self.source.list() => r,
            };
            let list = match listed {
                Ok(list) => {
                    metrics::counter!("kube_state_metrics_list_total", "resource" => self.resource.clone(), "result" => "success").increment(1);
                    list
                }
                Err(e) => {
                    metrics::counter!("kube_state_metrics_list_total", "resource" => self.resource.clone(), "result" => "error").increment(1);
                    warn!(resource = %self.resource, ns = %self.namespace, error = ?e, backoff_ms = backoff.as_millis() as u64, "list failed");
                    if !self.pause(&cancel, &mut backoff).await {
                        break;
                    }
                    continue;
                }
            };
            if cancel.is_cancelled() {
                break;
            }
            debug!(resource = %self.resource, ns = %self.namespace, count = list.items.len(), rv = %list.resource_version, "listed");
            self.store.replace(&list.items);
            backoff = self.config.min_backoff;

            let mut rv = list.resource_version;
            match self.watch(&cancel, &mut rv).await {
                WatchEnd::Cancelled => break,
                WatchEnd::Closed => {
                    debug!(resource = %self.resource, ns = %self.namespace, rv = %rv, "watch closed; resyncing");
                }
                WatchEnd::Failed(e) => {
                    warn!(resource = %self.resource, ns = %self.namespace, error = ?e, "watch failed; resyncing");
                    if !self.pause(&cancel, &mut backoff).await {
                        break;
                    }
                }
            }
            metrics::counter!("kube_state_metrics_resyncs_total", "resource" => self.resource.clone()).increment(1);
        }
        info!(resource = %self.resource, ns = %self.namespace, "reflector stopped");
    }

    /// Sleep for the current backoff, then double it. False when cancelled.
    async fn pause(&self, cancel: &CancellationToken, backoff: &mut Duration) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(*backoff) => {
                *backoff = (*backoff * 2).min(self.config.max_backoff);
                true
            }
        }
    }

    async fn watch(&self, cancel: &CancellationToken, rv: &mut String) -> WatchEnd {
        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => return WatchEnd::Cancelled,
            s = self.source.watch(rv.as_str()) => s,
        };
        let mut stream = match started {
            Ok(s) => s,
            Err(e) => return WatchEnd::Failed(e),
        };
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return WatchEnd::Cancelled,
                n = stream.next() => n,
            };
            let event = match next {
                None => return WatchEnd::Closed,
                Some(Err(e)) => return WatchEnd::Failed(e),
                Some(Ok(ev)) => ev,
            };
            match event {
                WatchEvent::Added(obj) => {
                    self.count("added");
                    advance(rv, &obj);
                    self.store.add(&obj);
                }
                WatchEvent::Modified(obj) => {
                    self.count("modified");
                    advance(rv, &obj);
                    self.store.update(&obj);
                }
                WatchEvent::Deleted(obj) => {
                    self.count("deleted");
                    advance(rv, &obj);
                    self.store.delete(&obj);
                }
                WatchEvent::Bookmark(b) => {
                    self.count("bookmark");
                    *rv = b.metadata.resource_version;
                }
                WatchEvent::Error(e) => {
                    self.count("error");
                    // 410 Gone: resource version too old, a plain relist recovers.
                    if e.code == 410 {
                        return WatchEnd::Closed;
                    }
                    return WatchEnd::Failed(anyhow!("watch error {} ({}): {}", e.code, e.reason, e.message));
                }
            }
        }
    }

    fn count(&self, event: &'static str) {
        metrics::counter!("kube_state_metrics_watch_events_total", "resource" => self.resource.clone(), "event" => event).increment(1);
    }
}

fn advance<K: Resource>(rv: &mut String, obj: &K) {
    if let Some(v) = obj.meta().resource_version.as_deref() {
        if !v.is_empty() {
            *rv = v.to_string();
        }
    }
}
