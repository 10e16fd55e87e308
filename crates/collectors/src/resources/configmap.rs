use k8s_openapi::api::core::v1::ConfigMap;
use kubestate_core::{Family, FamilyGenerator, Metric, MetricType};

use super::{family, metadata_families, Identity};
use crate::FamilyOptions;

const ID: Identity = Identity::Namespaced("configmap");

pub fn families(opts: &FamilyOptions) -> Vec<FamilyGenerator<ConfigMap>> {
    let mut out = metadata_families(ID, "kube_configmap", opts);
    out.push(family(ID, "kube_configmap_info", "Information about configmap.", MetricType::Info, |_: &ConfigMap| {
        Ok(Family::single(Metric::new(1.0)))
    }));
    out.push(family(
        ID,
        "kube_configmap_metadata_resource_version",
        "Resource version representing a specific version of the configmap.",
        MetricType::Gauge,
        // Resource versions are opaque; only numeric ones are exposed.
        |c: &ConfigMap| {
            Ok(c.metadata
                .resource_version
                .as_deref()
                .and_then(|rv| rv.parse::<f64>().ok())
                .map(|v| Family::single(Metric::new(v)))
                .unwrap_or_default())
        },
    ));
    out
}
