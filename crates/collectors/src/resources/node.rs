use k8s_openapi::api::core::v1::Node;
use kubestate_core::{Family, FamilyGenerator, Metric, MetricType, RenderError};

use super::{condition_state_set, family, gauge, metadata_families, Identity};
use crate::FamilyOptions;

const ID: Identity = Identity::Cluster("node");

pub fn families(opts: &FamilyOptions) -> Vec<FamilyGenerator<Node>> {
    let mut out = metadata_families(ID, "kube_node", opts);
    out.push(family(ID, "kube_node_info", "Information about a cluster node.", MetricType::Info, |n: &Node| {
        let status = n.status.as_ref().ok_or(RenderError::MissingField("status"))?;
        let info = status.node_info.as_ref().ok_or(RenderError::MissingField("status.nodeInfo"))?;
        let spec = n.spec.as_ref();
        Ok(Family::single(Metric::new(1.0).with_labels([
            ("kernel_version", info.kernel_version.clone()),
            ("os_image", info.os_image.clone()),
            ("container_runtime_version", info.container_runtime_version.clone()),
            ("kubelet_version", info.kubelet_version.clone()),
            ("kubeproxy_version", info.kube_proxy_version.clone()),
            ("provider_id", spec.and_then(|s| s.provider_id.clone()).unwrap_or_default()),
            ("pod_cidr", spec.and_then(|s| s.pod_cidr.clone()).unwrap_or_default()),
        ])))
    }));
    out.push(family(
        ID,
        "kube_node_spec_unschedulable",
        "Whether a node can schedule new pods.",
        MetricType::Gauge,
        |n: &Node| {
            let unschedulable = n.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false);
            Ok(gauge(if unschedulable { 1.0 } else { 0.0 }))
        },
    ));
    out.push(family(ID, "kube_node_spec_taint", "The taint of a cluster node.", MetricType::Gauge, |n: &Node| {
        let taints = n.spec.as_ref().and_then(|s| s.taints.as_ref());
        Ok(taints
            .into_iter()
            .flatten()
            .map(|t| {
                Metric::new(1.0).with_labels([
                    ("key", t.key.clone()),
                    ("value", t.value.clone().unwrap_or_default()),
                    ("effect", t.effect.clone()),
                ])
            })
            .collect::<Vec<_>>()
            .into())
    }));
    out.push(family(
        ID,
        "kube_node_status_condition",
        "The condition of a cluster node.",
        MetricType::StateSet,
        |n: &Node| {
            let status = n.status.as_ref().ok_or(RenderError::MissingField("status"))?;
            let mut metrics = Vec::new();
            for c in status.conditions.iter().flatten() {
                for mut m in condition_state_set(&c.status).metrics {
                    m.prepend_labels(&["condition_type"], &[c.type_.as_str()]);
                    metrics.push(m);
                }
            }
            Ok(metrics.into())
        },
    ));
    out
}
