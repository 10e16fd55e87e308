#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use kube::api::ObjectMeta;
use kubestate_collectors::resources::{configmap, namespace};
use kubestate_collectors::{BuildError, Builder, Collector, Registry};
use kubestate_core::{AllowDenyList, UnlistedPolicy};
use kubestate_kubehub::{ListResult, ListerWatcher, ServedResource, SourceFactory, WatchStream};
use tokio_util::sync::CancellationToken;

type Calls = Arc<Mutex<Vec<(String, Option<String>)>>>;

/// Lists a fixed set of objects once, then watches forever without events.
struct StaticLister<K> {
    items: Vec<K>,
}

#[async_trait::async_trait]
impl<K: Clone + Send + Sync + 'static> ListerWatcher<K> for StaticLister<K> {
    async fn list(&self) -> Result<ListResult<K>> {
        Ok(ListResult { items: self.items.clone(), resource_version: "1".into() })
    }

    async fn watch(&self, _resource_version: &str) -> Result<WatchStream<K>> {
        Ok(futures::stream::pending().boxed())
    }
}

/// Records every `create` call; each namespace lists the objects living in it.
struct FakeFactory<K> {
    cluster: bool,
    objects: Vec<K>,
    calls: Calls,
}

impl<K> SourceFactory<K> for FakeFactory<K>
where
    K: kube::Resource + Clone + Send + Sync + 'static,
{
    fn cluster_scoped(&self) -> bool {
        self.cluster
    }

    fn create(&self, namespace: &str, field_selector: Option<&str>) -> Arc<dyn ListerWatcher<K>> {
        self.calls.lock().unwrap().push((namespace.to_string(), field_selector.map(str::to_string)));
        let items = self
            .objects
            .iter()
            .filter(|o| namespace.is_empty() || o.meta().namespace.as_deref() == Some(namespace))
            .cloned()
            .collect();
        Arc::new(StaticLister { items })
    }
}

fn cm(ns: &str, name: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta { name: Some(name.into()), namespace: Some(ns.into()), ..Default::default() },
        ..Default::default()
    }
}

fn ns(name: &str) -> Namespace {
    Namespace { metadata: ObjectMeta { name: Some(name.into()), ..Default::default() }, ..Default::default() }
}

struct Fixture {
    registry: Registry,
    cm_calls: Calls,
    ns_calls: Calls,
}

fn fixture() -> Fixture {
    let cm_calls = Calls::default();
    let ns_calls = Calls::default();
    let mut registry = Registry::new();
    registry.register(
        "configmaps",
        configmap::families,
        FakeFactory { cluster: false, objects: vec![cm("a", "one"), cm("b", "two")], calls: cm_calls.clone() },
    );
    registry.register(
        "namespaces",
        namespace::families,
        FakeFactory { cluster: true, objects: vec![ns("a"), ns("b")], calls: ns_calls.clone() },
    );
    Fixture { registry, cm_calls, ns_calls }
}

fn allow_all() -> Arc<AllowDenyList> {
    Arc::new(AllowDenyList::allow_all())
}

async fn wait_for(collector: &Collector, needle: &str) -> String {
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let out = collector.dump();
            if out.contains(needle) {
                return out;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    match found {
        Ok(out) => out,
        Err(_) => panic!("{:?} never appeared in:\n{}", needle, collector.dump()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn build_without_filter_fails() {
    let f = fixture();
    let err = Builder::new(f.registry, CancellationToken::new()).build().unwrap_err();
    assert!(matches!(err, BuildError::MissingFilter));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_kinds_are_skipped_and_order_is_sorted() {
    let f = fixture();
    let cancel = CancellationToken::new();
    let collectors = Builder::new(f.registry, cancel.clone())
        .with_enabled_resources(["namespaces", "widgets", "configmaps", "namespaces"])
        .with_family_filter(allow_all())
        .build()
        .unwrap();
    let names: Vec<_> = collectors.iter().map(Collector::resource).collect();
    assert_eq!(names, ["configmaps", "namespaces"]);
    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_enabled_list_builds_every_registered_kind() {
    let f = fixture();
    let cancel = CancellationToken::new();
    let collectors = Builder::new(f.registry, cancel.clone()).with_family_filter(allow_all()).build().unwrap();
    assert_eq!(collectors.len(), 2);
    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_source_per_namespace_but_one_for_cluster_kinds() {
    let f = fixture();
    let cancel = CancellationToken::new();
    let collectors = Builder::new(f.registry, cancel.clone())
        .with_enabled_resources(["configmaps", "namespaces"])
        .with_namespaces(vec!["a".into(), "b".into()])
        .with_family_filter(allow_all())
        .with_field_selector("configmaps", "metadata.name=one")
        .build()
        .unwrap();

    let mut cm_calls = f.cm_calls.lock().unwrap().clone();
    cm_calls.sort();
    assert_eq!(
        cm_calls,
        [("a".to_string(), Some("metadata.name=one".to_string())), ("b".to_string(), Some("metadata.name=one".to_string()))]
    );
    assert_eq!(f.ns_calls.lock().unwrap().as_slice(), [(String::new(), None)]);

    // Both namespaces feed the one configmap store.
    let out = wait_for(&collectors[0], "configmap=\"two\"").await;
    assert!(out.contains("kube_configmap_info{namespace=\"a\",configmap=\"one\"} 1\n"));
    assert!(out.contains("kube_configmap_info{namespace=\"b\",configmap=\"two\"} 1\n"));
    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_namespaces_get_one_source() {
    let f = fixture();
    let cancel = CancellationToken::new();
    let collectors = Builder::new(f.registry, cancel.clone())
        .with_enabled_resources(["configmaps"])
        .with_namespaces(vec!["a".into(), "a".into(), String::new()])
        .with_family_filter(allow_all())
        .build()
        .unwrap();

    assert_eq!(f.cm_calls.lock().unwrap().as_slice(), [("a".to_string(), None)]);
    let out = wait_for(&collectors[0], "configmap=\"one\"").await;
    assert_eq!(out.matches("kube_configmap_info{namespace=\"a\",configmap=\"one\"} 1\n").count(), 1);
    assert!(!out.contains("configmap=\"two\""));
    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kinds_the_apiserver_does_not_serve_are_skipped() {
    let f = fixture();
    let cancel = CancellationToken::new();
    let collectors = Builder::new(f.registry, cancel.clone())
        .with_enabled_resources(["configmaps", "namespaces"])
        .with_served_resources([ServedResource::of::<ConfigMap>(), ServedResource::new("apps", "v1", "deployments")])
        .with_family_filter(allow_all())
        .build()
        .unwrap();

    let names: Vec<_> = collectors.iter().map(Collector::resource).collect();
    assert_eq!(names, ["configmaps"]);
    assert!(f.ns_calls.lock().unwrap().is_empty());
    assert_eq!(f.cm_calls.lock().unwrap().len(), 1);
    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn denied_families_are_absent_from_the_dump() {
    let f = fixture();
    let cancel = CancellationToken::new();
    let filter = AllowDenyList::new(&[], &["kube_configmap_(labels|annotations)".to_string()], UnlistedPolicy::Auto).unwrap();
    let collectors = Builder::new(f.registry, cancel.clone())
        .with_enabled_resources(["configmaps"])
        .with_family_filter(Arc::new(filter))
        .build()
        .unwrap();

    let out = wait_for(&collectors[0], "configmap=\"one\"").await;
    assert!(out.contains("# TYPE kube_configmap_info gauge\n"));
    assert!(out.contains("# TYPE kube_configmap_created gauge\n"));
    assert!(!out.contains("kube_configmap_labels"));
    assert!(!out.contains("kube_configmap_annotations"));
    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reflectors_stop_on_cancel() {
    let f = fixture();
    let cancel = CancellationToken::new();
    let builder = Builder::new(f.registry, cancel.clone()).with_family_filter(allow_all());
    let collectors = builder.build().unwrap();
    wait_for(&collectors[1], "namespace=\"b\"").await;

    cancel.cancel();
    let tracker = builder.task_tracker();
    tracker.close();
    tokio::time::timeout(Duration::from_secs(2), tracker.wait()).await.expect("reflectors must exit after cancel");
}
