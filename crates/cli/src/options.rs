use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kubestate_core::UnlistedPolicy;
use kubestate_kubehub::{ReflectorConfig, DEFAULT_WATCH_TIMEOUT_SECS, MAX_WATCH_TIMEOUT_SECS};

#[derive(Parser, Debug, Clone)]
#[command(name = "kube-state-metrics", version, about = "Metrics about the state of Kubernetes objects")]
pub struct Options {
    /// Address the scrape server binds to
    #[arg(long, env = "KSM_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "KSM_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address of the self-telemetry exporter
    #[arg(long = "telemetry-host", env = "KSM_TELEMETRY_HOST", default_value = "0.0.0.0")]
    pub telemetry_host: String,

    #[arg(long = "telemetry-port", env = "KSM_TELEMETRY_PORT", default_value_t = 8081)]
    pub telemetry_port: u16,

    /// Comma-separated resource kinds to expose (default: all)
    #[arg(long, env = "KSM_RESOURCES", value_delimiter = ',')]
    pub resources: Vec<String>,

    /// Comma-separated namespaces to watch (default: all)
    #[arg(long, env = "KSM_NAMESPACES", value_delimiter = ',')]
    pub namespaces: Vec<String>,

    /// Family name patterns to expose
    #[arg(long = "metric-allowlist", env = "KSM_METRIC_ALLOWLIST", value_delimiter = ',')]
    pub metric_allowlist: Vec<String>,

    /// Family name patterns to hide; wins over the allowlist
    #[arg(long = "metric-denylist", env = "KSM_METRIC_DENYLIST", value_delimiter = ',')]
    pub metric_denylist: Vec<String>,

    /// Fate of families matching neither list: auto, admit or deny
    #[arg(long = "metric-unlisted", env = "KSM_METRIC_UNLISTED", default_value = "auto")]
    pub metric_unlisted: UnlistedPolicy,

    /// Object labels to expose per kind, e.g. `pods=[app,team],nodes=[*]`
    #[arg(long = "metric-labels-allowlist", env = "KSM_METRIC_LABELS_ALLOWLIST")]
    pub metric_labels_allowlist: Option<String>,

    /// Object annotations to expose per kind, same form as the labels allowlist
    #[arg(long = "metric-annotations-allowlist", env = "KSM_METRIC_ANNOTATIONS_ALLOWLIST")]
    pub metric_annotations_allowlist: Option<String>,

    /// Only watch pods scheduled on this node
    #[arg(long, env = "KSM_NODE")]
    pub node: Option<String>,

    /// Kubeconfig file; when unset, in-cluster config or `KUBECONFIG` is used
    #[arg(long, env = "KSM_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long = "relist-backoff-max-secs", env = "KSM_RELIST_BACKOFF_MAX_SECS", default_value_t = 30)]
    pub relist_backoff_max_secs: u64,

    /// Server-side watch timeout; the apiserver rejects 295s and above
    #[arg(
        long = "watch-timeout-secs",
        env = "KSM_WATCH_TIMEOUT_SECS",
        default_value_t = DEFAULT_WATCH_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u32).range(1..=MAX_WATCH_TIMEOUT_SECS as i64)
    )]
    pub watch_timeout_secs: u32,
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = host.parse().with_context(|| format!("invalid listen host {:?}", host))?;
    Ok(SocketAddr::new(ip, port))
}

impl Options {
    pub fn scrape_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.host, self.port)
    }

    pub fn telemetry_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.telemetry_host, self.telemetry_port)
    }

    pub fn reflector_config(&self) -> ReflectorConfig {
        let defaults = ReflectorConfig::default();
        let max_backoff = Duration::from_secs(self.relist_backoff_max_secs).max(defaults.min_backoff);
        ReflectorConfig { max_backoff, ..defaults }
    }

    /// Field selector restricting the pods reflector, when `--node` is set.
    pub fn pod_field_selector(&self) -> Option<String> {
        self.node.as_deref().filter(|n| !n.is_empty()).map(|n| format!("spec.nodeName={}", n))
    }
}
