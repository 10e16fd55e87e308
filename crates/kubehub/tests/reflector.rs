#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::channel::mpsc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use kube::core::{ErrorResponse, WatchEvent};
use kubestate_core::{ComposedGenerator, Family, FamilyGenerator, Metric, MetricType, ObjectKey, WatchStore};
use kubestate_kubehub::{ListResult, ListerWatcher, Reflector, ReflectorConfig, WatchStream};
use kubestate_store::MetricsStore;
use tokio_util::sync::CancellationToken;

type Tx = mpsc::UnboundedSender<Result<WatchEvent<ConfigMap>>>;

/// Scripted source: each `list` pops the next listing, each `watch` pops the
/// next event channel. Once watches run out it blocks forever.
#[derive(Default)]
struct FakeSource {
    lists: Mutex<VecDeque<Vec<ConfigMap>>>,
    watches: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<WatchEvent<ConfigMap>>>>>,
    list_calls: AtomicUsize,
    watched_rvs: Mutex<Vec<String>>,
}

impl FakeSource {
    fn push_list(&self, items: Vec<ConfigMap>) {
        self.lists.lock().unwrap().push_back(items);
    }

    fn push_watch(&self) -> Tx {
        let (tx, rx) = mpsc::unbounded();
        self.watches.lock().unwrap().push_back(rx);
        tx
    }
}

#[async_trait::async_trait]
impl ListerWatcher<ConfigMap> for FakeSource {
    async fn list(&self) -> Result<ListResult<ConfigMap>> {
        let n = self.list_calls.fetch_add(1, Ordering::SeqCst);
        match self.lists.lock().unwrap().pop_front() {
            Some(items) => Ok(ListResult { items, resource_version: format!("{}", (n + 1) * 100) }),
            None => Err(anyhow!("no more listings")),
        }
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream<ConfigMap>> {
        self.watched_rvs.lock().unwrap().push(resource_version.to_string());
        match self.watches.lock().unwrap().pop_front() {
            Some(rx) => Ok(rx.boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

fn cm(name: &str, rv: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("ns".into()),
            resource_version: Some(rv.into()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn store() -> Arc<MetricsStore<ConfigMap>> {
    let info = FamilyGenerator::new("test_configmap_info", "Info.", MetricType::Info, |c: &ConfigMap| {
        Ok(Family::single(
            Metric::new(1.0)
                .with_label("namespace", c.metadata.namespace.clone().unwrap_or_default())
                .with_label("configmap", c.metadata.name.clone().unwrap_or_default()),
        ))
    });
    Arc::new(MetricsStore::new("configmaps", ComposedGenerator::compose(vec![info]).unwrap()))
}

fn fast() -> ReflectorConfig {
    ReflectorConfig { min_backoff: Duration::from_millis(1), max_backoff: Duration::from_millis(5) }
}

fn start(
    source: &Arc<FakeSource>,
    store: &Arc<MetricsStore<ConfigMap>>,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let sink: Arc<dyn WatchStore<ConfigMap>> = store.clone();
    let src: Arc<dyn ListerWatcher<ConfigMap>> = source.clone();
    let reflector = Reflector::new("configmaps", "ns", src, sink).with_config(fast());
    let handle = tokio::spawn(reflector.run(cancel.child_token()));
    (cancel, handle)
}

async fn wait_for_keys(store: &MetricsStore<ConfigMap>, want: &[&str]) {
    let want: Vec<ObjectKey> = want.iter().map(|n| ObjectKey::new("ns", *n)).collect();
    let ok = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.keys() == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(ok.is_ok(), "store never reached {:?}, has {:?}", want, store.keys());
}

async fn stop(cancel: CancellationToken, handle: tokio::task::JoinHandle<()>) {
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("reflector must exit promptly after cancel")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_add_delete_leaves_only_survivor() {
    let source = Arc::new(FakeSource::default());
    source.push_list(vec![]);
    let tx = source.push_watch();
    let store = store();
    let (cancel, handle) = start(&source, &store);

    tx.unbounded_send(Ok(WatchEvent::Added(cm("obj1", "101")))).unwrap();
    tx.unbounded_send(Ok(WatchEvent::Added(cm("obj2", "102")))).unwrap();
    tx.unbounded_send(Ok(WatchEvent::Deleted(cm("obj1", "103")))).unwrap();
    wait_for_keys(&store, &["obj2"]).await;

    let out = store.dump();
    assert!(out.starts_with("# HELP test_configmap_info Info.\n# TYPE test_configmap_info gauge\n"));
    assert!(out.contains("configmap=\"obj2\""));
    assert!(!out.contains("configmap=\"obj1\""));
    assert_eq!(source.watched_rvs.lock().unwrap().as_slice(), ["100"]);

    stop(cancel, handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_stream_relists_and_drops_vanished_objects() {
    let source = Arc::new(FakeSource::default());
    source.push_list(vec![cm("a", "1"), cm("b", "2")]);
    source.push_list(vec![cm("b", "3"), cm("c", "4")]);
    let first = source.push_watch();
    let store = store();
    let (cancel, handle) = start(&source, &store);

    wait_for_keys(&store, &["a", "b"]).await;
    drop(first);
    wait_for_keys(&store, &["b", "c"]).await;
    assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);

    stop(cancel, handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_errors_trigger_resync() {
    let source = Arc::new(FakeSource::default());
    source.push_list(vec![cm("a", "1")]);
    source.push_list(vec![]);
    let tx = source.push_watch();
    let store = store();
    let (cancel, handle) = start(&source, &store);

    wait_for_keys(&store, &["a"]).await;
    tx.unbounded_send(Ok(WatchEvent::Error(ErrorResponse {
        status: "Failure".into(),
        message: "too old resource version".into(),
        reason: "Expired".into(),
        code: 410,
    })))
    .unwrap();
    wait_for_keys(&store, &[]).await;

    stop(cancel, handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_failures_back_off_until_success() {
    let source = Arc::new(FakeSource::default());
    let store = store();
    let (cancel, handle) = start(&source, &store);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(source.list_calls.load(Ordering::SeqCst) >= 2);
    source.push_list(vec![cm("late", "9")]);
    wait_for_keys(&store, &["late"]).await;

    stop(cancel, handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_writes_after_cancel() {
    let source = Arc::new(FakeSource::default());
    source.push_list(vec![]);
    let tx = source.push_watch();
    let store = store();
    let (cancel, handle) = start(&source, &store);

    tx.unbounded_send(Ok(WatchEvent::Added(cm("before", "1")))).unwrap();
    wait_for_keys(&store, &["before"]).await;
    stop(cancel, handle).await;

    // The receiver is gone with the task; nothing reaches the store any more.
    let _ = tx.unbounded_send(Ok(WatchEvent::Added(cm("after", "2"))));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.keys(), vec![ObjectKey::new("ns", "before")]);
}
