use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetStatus};
use kubestate_core::{Family, FamilyGenerator, MetricType, RenderError};

use super::{family, gauge, gauge_i64, metadata_families, Identity};
use crate::FamilyOptions;

const ID: Identity = Identity::Namespaced("daemonset");

type StatusFn = fn(&DaemonSetStatus) -> Family;

const STATUS: &[(&str, &str, StatusFn)] = &[
    (
        "kube_daemonset_status_current_number_scheduled",
        "The number of nodes running at least one daemon pod and are supposed to.",
        |s| gauge(s.current_number_scheduled),
    ),
    (
        "kube_daemonset_status_desired_number_scheduled",
        "The number of nodes that should be running the daemon pod.",
        |s| gauge(s.desired_number_scheduled),
    ),
    (
        "kube_daemonset_status_number_available",
        "The number of nodes that should be running the daemon pod and have one or more of the daemon pod running and available",
        |s| gauge(s.number_available.unwrap_or(0)),
    ),
    (
        "kube_daemonset_status_number_misscheduled",
        "The number of nodes running a daemon pod but are not supposed to.",
        |s| gauge(s.number_misscheduled),
    ),
    (
        "kube_daemonset_status_number_ready",
        "The number of nodes that should be running the daemon pod and have one or more of the daemon pod running and ready.",
        |s| gauge(s.number_ready),
    ),
    (
        "kube_daemonset_status_number_unavailable",
        "The number of nodes that should be running the daemon pod and have none of the daemon pod running and available",
        |s| gauge(s.number_unavailable.unwrap_or(0)),
    ),
    (
        "kube_daemonset_status_updated_number_scheduled",
        "The total number of nodes that are running updated daemon pod",
        |s| gauge(s.updated_number_scheduled.unwrap_or(0)),
    ),
    (
        "kube_daemonset_status_observed_generation",
        "The most recent generation observed by the daemon set controller.",
        |s| s.observed_generation.map(gauge_i64).unwrap_or_default(),
    ),
];

pub fn families(opts: &FamilyOptions) -> Vec<FamilyGenerator<DaemonSet>> {
    let mut out = metadata_families(ID, "kube_daemonset", opts);
    out.push(family(
        ID,
        "kube_daemonset_metadata_generation",
        "Sequence number representing a specific generation of the desired state.",
        MetricType::Gauge,
        |d: &DaemonSet| Ok(d.metadata.generation.map(gauge_i64).unwrap_or_default()),
    ));
    for &(name, help, f) in STATUS {
        out.push(family(ID, name, help, MetricType::Gauge, move |d: &DaemonSet| {
            let status = d.status.as_ref().ok_or(RenderError::MissingField("status"))?;
            Ok(f(status))
        }));
    }
    out
}
