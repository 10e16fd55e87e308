use k8s_openapi::api::core::v1::Service;
use kubestate_core::{Family, FamilyGenerator, Metric, MetricType, RenderError};

use super::{family, metadata_families, Identity};
use crate::FamilyOptions;

const ID: Identity = Identity::Namespaced("service");

pub fn families(opts: &FamilyOptions) -> Vec<FamilyGenerator<Service>> {
    let mut out = metadata_families(ID, "kube_service", opts);
    out.push(family(ID, "kube_service_info", "Information about service.", MetricType::Info, |s: &Service| {
        let spec = s.spec.as_ref().ok_or(RenderError::MissingField("spec"))?;
        Ok(Family::single(Metric::new(1.0).with_labels([
            ("cluster_ip", spec.cluster_ip.clone().unwrap_or_default()),
            ("external_name", spec.external_name.clone().unwrap_or_default()),
            ("load_balancer_ip", spec.load_balancer_ip.clone().unwrap_or_default()),
        ])))
    }));
    out.push(family(ID, "kube_service_spec_type", "Type about service.", MetricType::Gauge, |s: &Service| {
        let spec = s.spec.as_ref().ok_or(RenderError::MissingField("spec"))?;
        let kind = spec.type_.clone().unwrap_or_else(|| "ClusterIP".to_string());
        Ok(Family::single(Metric::new(1.0).with_label("type", kind)))
    }));
    out.push(family(
        ID,
        "kube_service_spec_external_ip",
        "Service external ips. One series for each ip",
        MetricType::Gauge,
        |s: &Service| {
            let ips = s.spec.as_ref().and_then(|sp| sp.external_ips.as_ref());
            Ok(ips.into_iter().flatten().map(|ip| Metric::new(1.0).with_label("external_ip", ip.clone())).collect::<Vec<_>>().into())
        },
    ));
    out.push(family(
        ID,
        "kube_service_status_load_balancer_ingress",
        "Service load balancer ingress status",
        MetricType::Gauge,
        |s: &Service| {
            let ingress = s
                .status
                .as_ref()
                .and_then(|st| st.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_ref());
            Ok(ingress
                .into_iter()
                .flatten()
                .map(|i| {
                    Metric::new(1.0).with_labels([
                        ("ip", i.ip.clone().unwrap_or_default()),
                        ("hostname", i.hostname.clone().unwrap_or_default()),
                    ])
                })
                .collect::<Vec<_>>()
                .into())
        },
    ));
    out
}
