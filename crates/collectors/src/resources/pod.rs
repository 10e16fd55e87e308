use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodStatus};
use kubestate_core::{Family, FamilyGenerator, Metric, MetricType, RenderError};

use super::{condition_state_set, family, metadata_families, state_set, Identity};
use crate::FamilyOptions;

const ID: Identity = Identity::Namespaced("pod");

const PHASES: &[&str] = &["Pending", "Succeeded", "Failed", "Running", "Unknown"];

fn status(p: &Pod) -> Result<&PodStatus, RenderError> {
    p.status.as_ref().ok_or(RenderError::MissingField("status"))
}

fn condition(p: &Pod, kind: &str) -> Result<Family, RenderError> {
    let c = status(p)?.conditions.iter().flatten().find(|c| c.type_ == kind);
    Ok(c.map(|c| condition_state_set(&c.status)).unwrap_or_default())
}

/// One sample per container status, labelled with the container name.
fn per_container(p: &Pod, f: impl Fn(&ContainerStatus) -> Option<Metric>) -> Result<Family, RenderError> {
    let metrics = status(p)?
        .container_statuses
        .iter()
        .flatten()
        .filter_map(|cs| {
            f(cs).map(|mut m| {
                m.prepend_labels(&["container"], &[cs.name.as_str()]);
                m
            })
        })
        .collect::<Vec<_>>();
    Ok(metrics.into())
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

pub fn families(opts: &FamilyOptions) -> Vec<FamilyGenerator<Pod>> {
    let mut out = metadata_families(ID, "kube_pod", opts);
    out.push(family(ID, "kube_pod_info", "Information about pod.", MetricType::Info, |p: &Pod| {
        let spec = p.spec.as_ref();
        let st = p.status.as_ref();
        let controller = p.metadata.owner_references.iter().flatten().find(|o| o.controller == Some(true));
        Ok(Family::single(Metric::new(1.0).with_labels([
            ("host_ip", st.and_then(|s| s.host_ip.clone()).unwrap_or_default()),
            ("pod_ip", st.and_then(|s| s.pod_ip.clone()).unwrap_or_default()),
            ("uid", p.metadata.uid.clone().unwrap_or_default()),
            ("node", spec.and_then(|s| s.node_name.clone()).unwrap_or_default()),
            ("created_by_kind", controller.map(|o| o.kind.clone()).unwrap_or_else(|| "<none>".to_string())),
            ("created_by_name", controller.map(|o| o.name.clone()).unwrap_or_else(|| "<none>".to_string())),
            ("priority_class", spec.and_then(|s| s.priority_class_name.clone()).unwrap_or_default()),
        ])))
    }));
    out.push(family(ID, "kube_pod_owner", "Information about the Pod's owner.", MetricType::Info, |p: &Pod| {
        let owners = p.metadata.owner_references.as_deref().unwrap_or_default();
        if owners.is_empty() {
            return Ok(Family::single(Metric::new(1.0).with_labels([
                ("owner_kind", "<none>"),
                ("owner_name", "<none>"),
                ("owner_is_controller", "<none>"),
            ])));
        }
        Ok(owners
            .iter()
            .map(|o| {
                Metric::new(1.0).with_labels([
                    ("owner_kind", o.kind.clone()),
                    ("owner_name", o.name.clone()),
                    ("owner_is_controller", o.controller.unwrap_or(false).to_string()),
                ])
            })
            .collect::<Vec<_>>()
            .into())
    }));
    out.push(family(ID, "kube_pod_start_time", "Start time in unix timestamp for a pod.", MetricType::Gauge, |p: &Pod| {
        Ok(match status(p)?.start_time.as_ref() {
            Some(t) => Family::single(Metric::new(t.0.timestamp() as f64)),
            None => Family::empty(),
        })
    }));
    out.push(family(ID, "kube_pod_status_phase", "The pods current phase.", MetricType::StateSet, |p: &Pod| {
        let phase = status(p)?.phase.as_deref();
        Ok(match phase {
            Some(_) => state_set("phase", PHASES, phase),
            None => Family::empty(),
        })
    }));
    out.push(family(
        ID,
        "kube_pod_status_ready",
        "Describes whether the pod is ready to serve requests.",
        MetricType::StateSet,
        |p: &Pod| condition(p, "Ready"),
    ));
    out.push(family(
        ID,
        "kube_pod_status_scheduled",
        "Describes the status of the scheduling process for the pod.",
        MetricType::StateSet,
        |p: &Pod| condition(p, "PodScheduled"),
    ));
    out.push(family(
        ID,
        "kube_pod_container_info",
        "Information about a container in a pod.",
        MetricType::Info,
        |p: &Pod| {
            per_container(p, |cs| {
                Some(Metric::new(1.0).with_labels([
                    ("image", cs.image.clone()),
                    ("image_id", cs.image_id.clone()),
                    ("container_id", cs.container_id.clone().unwrap_or_default()),
                ]))
            })
        },
    ));
    out.push(family(
        ID,
        "kube_pod_container_status_restarts_total",
        "The number of container restarts per container.",
        MetricType::Counter,
        |p: &Pod| per_container(p, |cs| Some(Metric::new(cs.restart_count as f64))),
    ));
    out.push(family(
        ID,
        "kube_pod_container_status_ready",
        "Describes whether the containers readiness check succeeded.",
        MetricType::Gauge,
        |p: &Pod| per_container(p, |cs| Some(Metric::new(flag(cs.ready)))),
    ));
    out.push(family(
        ID,
        "kube_pod_container_status_running",
        "Describes whether the container is currently in running state.",
        MetricType::Gauge,
        |p: &Pod| per_container(p, |cs| Some(Metric::new(flag(cs.state.as_ref().is_some_and(|s| s.running.is_some()))))),
    ));
    out.push(family(
        ID,
        "kube_pod_container_status_waiting_reason",
        "Describes the reason the container is currently in waiting state.",
        MetricType::Gauge,
        |p: &Pod| {
            per_container(p, |cs| {
                let waiting = cs.state.as_ref()?.waiting.as_ref()?;
                Some(Metric::new(1.0).with_label("reason", waiting.reason.clone().unwrap_or_default()))
            })
        },
    ));
    out.push(family(
        ID,
        "kube_pod_container_status_terminated",
        "Describes whether the container is currently in terminated state.",
        MetricType::Gauge,
        |p: &Pod| per_container(p, |cs| Some(Metric::new(flag(cs.state.as_ref().is_some_and(|s| s.terminated.is_some()))))),
    ));
    out.push(family(
        ID,
        "kube_pod_spec_volumes_persistentvolumeclaims_info",
        "Information about persistentvolumeclaim volumes in a pod.",
        MetricType::Info,
        |p: &Pod| {
            let volumes = p.spec.as_ref().and_then(|s| s.volumes.as_ref());
            Ok(volumes
                .into_iter()
                .flatten()
                .filter_map(|v| {
                    let claim = v.persistent_volume_claim.as_ref()?;
                    Some(Metric::new(1.0).with_labels([
                        ("volume", v.name.clone()),
                        ("persistentvolumeclaim", claim.claim_name.clone()),
                    ]))
                })
                .collect::<Vec<_>>()
                .into())
        },
    ));
    out
}
