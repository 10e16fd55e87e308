use k8s_openapi::api::core::v1::Namespace;
use kubestate_core::{FamilyGenerator, MetricType, RenderError};

use super::{family, metadata_families, state_set, Identity};
use crate::FamilyOptions;

const ID: Identity = Identity::Cluster("namespace");

pub fn families(opts: &FamilyOptions) -> Vec<FamilyGenerator<Namespace>> {
    let mut out = metadata_families(ID, "kube_namespace", opts);
    out.push(family(ID, "kube_namespace_status_phase", "kubernetes namespace status phase.", MetricType::StateSet, |n: &Namespace| {
        let status = n.status.as_ref().ok_or(RenderError::MissingField("status"))?;
        Ok(state_set("phase", &["Active", "Terminating"], status.phase.as_deref()))
    }));
    out
}
