//! Metric family tables per resource kind, plus the helpers they share.

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::{Client, Resource};
use kubestate_core::{allowed_label_pairs, Family, FamilyGenerator, Metric, MetricType, RenderError};
use kubestate_kubehub::KubeSourceFactory;

use crate::{FamilyOptions, Registry};

pub mod configmap;
pub mod daemonset;
pub mod namespace;
pub mod node;
pub mod pod;
pub mod poddisruptionbudget;
pub mod service;

/// Registry with every built-in kind, watched through `client`.
pub fn default_registry(client: Client, watch_timeout_secs: u32) -> Registry {
    let mut r = Registry::new();
    r.register(
        "configmaps",
        configmap::families,
        KubeSourceFactory::<ConfigMap>::namespaced(client.clone()).with_watch_timeout(watch_timeout_secs),
    );
    r.register(
        "daemonsets",
        daemonset::families,
        KubeSourceFactory::<DaemonSet>::namespaced(client.clone()).with_watch_timeout(watch_timeout_secs),
    );
    r.register(
        "namespaces",
        namespace::families,
        KubeSourceFactory::<Namespace>::cluster(client.clone()).with_watch_timeout(watch_timeout_secs),
    );
    r.register(
        "nodes",
        node::families,
        KubeSourceFactory::<Node>::cluster(client.clone()).with_watch_timeout(watch_timeout_secs),
    );
    r.register(
        "poddisruptionbudgets",
        poddisruptionbudget::families,
        KubeSourceFactory::<PodDisruptionBudget>::namespaced(client.clone()).with_watch_timeout(watch_timeout_secs),
    );
    r.register(
        "pods",
        pod::families,
        KubeSourceFactory::<Pod>::namespaced(client.clone()).with_watch_timeout(watch_timeout_secs),
    );
    r.register(
        "services",
        service::families,
        KubeSourceFactory::<Service>::namespaced(client).with_watch_timeout(watch_timeout_secs),
    );
    r
}

/// Identity labels every family of a kind starts with.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Identity {
    /// `namespace`, then the kind label holding the object name.
    Namespaced(&'static str),
    /// Only the kind label.
    Cluster(&'static str),
}

impl Identity {
    fn apply<K: Resource>(self, obj: &K, family: &mut Family) {
        let meta = obj.meta();
        let name = meta.name.as_deref().unwrap_or_default();
        match self {
            Identity::Namespaced(kind) => {
                let ns = meta.namespace.as_deref().unwrap_or_default();
                for m in &mut family.metrics {
                    m.prepend_labels(&["namespace", kind], &[ns, name]);
                }
            }
            Identity::Cluster(kind) => {
                for m in &mut family.metrics {
                    m.prepend_labels(&[kind], &[name]);
                }
            }
        }
    }
}

/// A generator whose metrics get the kind's identity labels prepended.
pub(crate) fn family<K, F>(id: Identity, name: &str, help: &str, metric_type: MetricType, f: F) -> FamilyGenerator<K>
where
    K: Resource + 'static,
    F: Fn(&K) -> Result<Family, RenderError> + Send + Sync + 'static,
{
    FamilyGenerator::new(name, help, metric_type, move |obj: &K| {
        let mut fam = f(obj)?;
        id.apply(obj, &mut fam);
        Ok(fam)
    })
}

/// `_created`, `_labels` and `_annotations` for kind prefix `prefix` (e.g. `kube_pod`).
pub(crate) fn metadata_families<K>(id: Identity, prefix: &str, opts: &FamilyOptions) -> Vec<FamilyGenerator<K>>
where
    K: Resource + 'static,
{
    let labels = opts.labels.clone();
    let annotations = opts.annotations.clone();
    vec![
        family(id, &format!("{}_created", prefix), "Unix creation timestamp", MetricType::Gauge, |o: &K| {
            Ok(match o.meta().creation_timestamp.as_ref() {
                Some(t) => Family::single(Metric::new(t.0.timestamp() as f64)),
                None => Family::empty(),
            })
        }),
        family(
            id,
            &format!("{}_labels", prefix),
            "Kubernetes labels converted to Prometheus labels.",
            MetricType::Gauge,
            move |o: &K| Ok(Family::single(Metric::new(1.0).with_labels(allowed_label_pairs("label", o.meta().labels.as_ref(), &labels)))),
        ),
        family(
            id,
            &format!("{}_annotations", prefix),
            "Kubernetes annotations converted to Prometheus labels.",
            MetricType::Gauge,
            move |o: &K| {
                Ok(Family::single(Metric::new(1.0).with_labels(allowed_label_pairs(
                    "annotation",
                    o.meta().annotations.as_ref(),
                    &annotations,
                ))))
            },
        ),
    ]
}

/// One sample per state in `states`, 1 for `current` and 0 otherwise.
pub(crate) fn state_set(label: &str, states: &[&str], current: Option<&str>) -> Family {
    states
        .iter()
        .map(|s| Metric::new(if current == Some(*s) { 1.0 } else { 0.0 }).with_label(label, *s))
        .collect::<Vec<_>>()
        .into()
}

/// Condition status (`True`/`False`/`Unknown`) as a three-way state set.
pub(crate) fn condition_state_set(status: &str) -> Family {
    let current = match status {
        "True" => "true",
        "False" => "false",
        _ => "unknown",
    };
    state_set("condition", &["true", "false", "unknown"], Some(current))
}

/// Gauge with a single unlabelled sample.
pub(crate) fn gauge(v: impl Into<f64>) -> Family {
    Family::single(Metric::new(v.into()))
}

/// Integer counts that k8s-openapi models as `i64` lose nothing meaningful as f64.
pub(crate) fn gauge_i64(v: i64) -> Family {
    Family::single(Metric::new(v as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_set_marks_current() {
        let f = state_set("phase", &["Active", "Terminating"], Some("Terminating"));
        let mut out = String::new();
        f.render("kube_namespace_status_phase", &mut out).unwrap();
        assert_eq!(
            out,
            "kube_namespace_status_phase{phase=\"Active\"} 0\nkube_namespace_status_phase{phase=\"Terminating\"} 1\n"
        );
    }

    #[test]
    fn unknown_condition_status() {
        let f = condition_state_set("Maybe");
        let ones: Vec<_> = f.metrics.iter().filter(|m| m.value == 1.0).map(|m| m.label_values[0].as_str()).collect();
        assert_eq!(ones, ["unknown"]);
    }
}
