//! HTTP scrape endpoint over the built collectors.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use kubestate_collectors::Collector;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const INDEX: &str = "<html>\n<head><title>Kube Metrics Server</title></head>\n<body>\n<h1>Kube Metrics</h1>\n<ul>\n<li><a href='/metrics'>metrics</a></li>\n<li><a href='/healthz'>healthz</a></li>\n</ul>\n</body>\n</html>\n";

#[derive(Clone)]
pub struct ScrapeState {
    collectors: Arc<[Collector]>,
}

impl ScrapeState {
    pub fn new(collectors: Vec<Collector>) -> Self {
        Self { collectors: collectors.into() }
    }
}

pub fn router(state: ScrapeState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<ScrapeState>) -> impl IntoResponse {
    let start = Instant::now();
    let mut body = String::new();
    for c in state.collectors.iter() {
        c.write_all(&mut body);
    }
    metrics::histogram!("kube_state_metrics_scrape_duration_seconds").record(start.elapsed().as_secs_f64());
    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn index() -> Html<&'static str> {
    Html(INDEX)
}
