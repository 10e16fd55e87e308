//! kubestate store: thread-safe cache of pre-rendered metric text per object.
//!
//! Rendering happens outside the lock; the write lock is only held to swap
//! entries. `write_all` snapshots the entry pointers under the read lock and
//! serializes after releasing it, so a slow scrape never stalls watch events.

#![forbid(unsafe_code)]

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use kube::Resource;
use kubestate_core::{ComposedGenerator, ObjectKey, WatchStore};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Something the serving layer can dump into a scrape body.
pub trait MetricsDump: Send + Sync {
    /// Resource kind this dump covers, e.g. `pods`.
    fn resource(&self) -> &str;
    /// Append headers and every cached metric line.
    fn write_all(&self, out: &mut String);
}

/// Rendered family bodies of one object, in header order. Replaced wholesale.
#[derive(Debug)]
struct CacheEntry {
    key: ObjectKey,
    bodies: Box<[String]>,
}

pub struct MetricsStore<K> {
    resource: String,
    /// `# HELP`/`# TYPE` text per family, fixed at construction.
    headers: Box<[String]>,
    generator: ComposedGenerator<K>,
    entries: RwLock<FxHashMap<ObjectKey, Arc<CacheEntry>>>,
}

impl<K: Resource> MetricsStore<K> {
    pub fn new(resource: impl Into<String>, generator: ComposedGenerator<K>) -> Self {
        let headers = generator.headers().iter().map(|h| h.to_text()).collect();
        Self { resource: resource.into(), headers, generator, entries: RwLock::new(FxHashMap::default()) }
    }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<ObjectKey, Arc<CacheEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<ObjectKey, Arc<CacheEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn render(&self, obj: &K) -> Arc<CacheEntry> {
        let key = ObjectKey::of(obj);
        let bodies = self.generator.render(obj).into_iter().map(|f| f.body).collect();
        Arc::new(CacheEntry { key, bodies })
    }

    /// Called with the write lock held so gauge updates follow map order.
    fn record_len(&self, len: usize) {
        metrics::gauge!("kube_state_metrics_store_objects", "resource" => self.resource.clone()).set(len as f64);
    }

    /// Insert or replace the entry for `obj`.
    pub fn upsert(&self, obj: &K) {
        let entry = self.render(obj);
        let mut map = self.write();
        map.insert(entry.key.clone(), entry);
        self.record_len(map.len());
    }

    pub fn remove(&self, obj: &K) {
        let key = ObjectKey::of(obj);
        let mut map = self.write();
        if map.remove(&key).is_some() {
            self.record_len(map.len());
        }
    }

    /// Reconcile the identities inside `namespace` (empty = all) with `objs`.
    /// Entries outside the namespace are left untouched. Readers see either the
    /// state before or after, never a mix.
    pub fn replace_in(&self, namespace: &str, objs: &[K]) {
        let fresh: Vec<Arc<CacheEntry>> = objs.iter().map(|o| self.render(o)).collect();
        let keep: FxHashSet<&ObjectKey> = fresh.iter().map(|e| &e.key).collect();
        let removed = {
            let mut map = self.write();
            let before = map.len();
            map.retain(|k, _| !k.in_namespace(namespace) || keep.contains(k));
            let removed = before - map.len();
            for e in &fresh {
                map.insert(e.key.clone(), Arc::clone(e));
            }
            self.record_len(map.len());
            removed
        };
        debug!(resource = %self.resource, ns = %namespace, objects = objs.len(), removed, "store replaced");
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Cached identities in dump order.
    pub fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<_> = self.read().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    pub fn family_count(&self) -> usize {
        self.headers.len()
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.write_all(&mut out);
        out
    }
}

impl<K: Resource> MetricsDump for MetricsStore<K> {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn write_all(&self, out: &mut String) {
        let mut snapshot: Vec<Arc<CacheEntry>> = self.read().values().cloned().collect();
        snapshot.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        for (i, header) in self.headers.iter().enumerate() {
            out.push_str(header);
            for entry in &snapshot {
                if let Some(body) = entry.bodies.get(i) {
                    out.push_str(body);
                }
            }
        }
    }
}

impl<K: Resource> WatchStore<K> for MetricsStore<K> {
    fn add(&self, obj: &K) {
        self.upsert(obj);
    }

    fn update(&self, obj: &K) {
        self.upsert(obj);
    }

    fn delete(&self, obj: &K) {
        self.remove(obj);
    }

    fn replace(&self, objs: &[K]) {
        self.replace_in("", objs);
    }
}

/// Writer handle for one reflector: `replace` only reconciles its namespace,
/// so several namespaces can feed one store without erasing each other.
pub struct NamespacedStore<K> {
    store: Arc<MetricsStore<K>>,
    namespace: String,
}

impl<K> NamespacedStore<K> {
    pub fn new(store: Arc<MetricsStore<K>>, namespace: impl Into<String>) -> Self {
        Self { store, namespace: namespace.into() }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl<K: Resource> WatchStore<K> for NamespacedStore<K> {
    fn add(&self, obj: &K) {
        self.store.upsert(obj);
    }

    fn update(&self, obj: &K) {
        self.store.upsert(obj);
    }

    fn delete(&self, obj: &K) {
        self.store.remove(obj);
    }

    fn replace(&self, objs: &[K]) {
        self.store.replace_in(&self.namespace, objs);
    }
}
