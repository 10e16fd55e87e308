use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use kubestate_collectors::{default_registry, Builder};
use kubestate_core::{AllowDenyList, LabelAllowlist};
use kubestate_kubehub::served_resources;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

mod options;
mod server;

use options::Options;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_tracing() {
    let env = std::env::var("KSM_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_telemetry(opts: &Options) {
    let addr = match opts.telemetry_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, "invalid telemetry address; self metrics disabled");
            return;
        }
    };
    match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!(%addr, "telemetry exporter listening"),
        Err(e) => warn!(error = %e, "failed to install telemetry exporter"),
    }
}

async fn kube_client(opts: &Options) -> Result<Client> {
    let client = match opts.kubeconfig.as_deref() {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).with_context(|| format!("reading kubeconfig {}", path.display()))?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("loading kubeconfig")?;
            Client::try_from(config).context("building kube client")?
        }
        None => Client::try_default().await.context("building kube client")?,
    };
    let version = client.apiserver_version().await.context("contacting apiserver")?;
    info!(version = %version.git_version, platform = %version.platform, "connected to apiserver");
    Ok(client)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let opts = Options::parse();
    init_telemetry(&opts);

    let filter = AllowDenyList::new(&opts.metric_allowlist, &opts.metric_denylist, opts.metric_unlisted)?;
    info!(filter = %filter.status(), "metric family filter");
    let labels = LabelAllowlist::parse(opts.metric_labels_allowlist.as_deref().unwrap_or_default())?;
    let annotations = LabelAllowlist::parse(opts.metric_annotations_allowlist.as_deref().unwrap_or_default())?;

    let client = kube_client(&opts).await?;
    let served = match served_resources(client.clone()).await {
        Ok(served) => Some(served),
        Err(e) => {
            warn!(error = %e, "api discovery failed; building every requested resource");
            None
        }
    };
    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    let mut builder = Builder::new(default_registry(client, opts.watch_timeout_secs), cancel.clone())
        .with_enabled_resources(opts.resources.iter().map(|r| r.trim()))
        .with_namespaces(opts.namespaces.iter().map(|n| n.trim().to_string()).collect())
        .with_family_filter(Arc::new(filter))
        .with_labels_allowlist(labels)
        .with_annotations_allowlist(annotations)
        .with_reflector_config(opts.reflector_config())
        .with_task_tracker(tracker.clone());
    if let Some(served) = served {
        builder = builder.with_served_resources(served);
    }
    if let Some(selector) = opts.pod_field_selector() {
        info!(%selector, "restricting pods to one node");
        builder = builder.with_field_selector("pods", selector);
    }
    let collectors = builder.build()?;

    let addr = opts.scrape_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    info!(%addr, "scrape server listening");

    let shutdown = cancel.clone();
    axum::serve(listener, server::router(server::ScrapeState::new(collectors)))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => info!("shutdown signal received"),
                _ = shutdown.cancelled() => {},
            }
            shutdown.cancel();
        })
        .await
        .context("scrape server")?;

    cancel.cancel();
    tracker.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, tracker.wait()).await.is_err() {
        warn!(grace = ?SHUTDOWN_GRACE, "reflectors did not stop in time");
    }
    info!("kube-state-metrics stopped");
    Ok(())
}
