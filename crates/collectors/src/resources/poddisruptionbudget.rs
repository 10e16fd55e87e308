use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetStatus};
use kubestate_core::{Family, FamilyGenerator, MetricType, RenderError};

use super::{family, gauge, gauge_i64, metadata_families, Identity};
use crate::FamilyOptions;

const ID: Identity = Identity::Namespaced("poddisruptionbudget");

type StatusFn = fn(&PodDisruptionBudgetStatus) -> Family;

const STATUS: &[(&str, &str, StatusFn)] = &[
    ("kube_poddisruptionbudget_status_current_healthy", "Current number of healthy pods", |s| gauge(s.current_healthy)),
    ("kube_poddisruptionbudget_status_desired_healthy", "Minimum desired number of healthy pods", |s| gauge(s.desired_healthy)),
    (
        "kube_poddisruptionbudget_status_pod_disruptions_allowed",
        "Number of pod disruptions that are currently allowed",
        |s| gauge(s.disruptions_allowed),
    ),
    (
        "kube_poddisruptionbudget_status_expected_pods",
        "Total number of pods counted by this disruption budget",
        |s| gauge(s.expected_pods),
    ),
    (
        "kube_poddisruptionbudget_status_observed_generation",
        "Most recent generation observed when updating this PDB status",
        |s| s.observed_generation.map(gauge_i64).unwrap_or_default(),
    ),
];

pub fn families(opts: &FamilyOptions) -> Vec<FamilyGenerator<PodDisruptionBudget>> {
    let mut out = metadata_families(ID, "kube_poddisruptionbudget", opts);
    for &(name, help, f) in STATUS {
        out.push(family(ID, name, help, MetricType::Gauge, move |p: &PodDisruptionBudget| {
            let status = p.status.as_ref().ok_or(RenderError::MissingField("status"))?;
            Ok(f(status))
        }));
    }
    out
}
