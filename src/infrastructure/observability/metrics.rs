//! Prometheus metrics
//!
//! Recording functions are free functions over the `metrics` facade; they
//! are no-ops until [`init_metrics`] installs the recorder.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

use super::config::MetricsConfig;

static UUID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("static regex")
});
static NUMERIC_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\d+(/|$)").expect("static regex"));

const MAX_PATH_LABEL: usize = 64;

/// Handle used by the /metrics endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the process-wide Prometheus recorder
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match builder_for(config).and_then(PrometheusBuilder::install_recorder) {
        Ok(handle) => {
            gauge!("edge_gateway_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            tracing::info!(
                path = %config.path,
                buckets = config.buckets().len(),
                "Prometheus metrics initialized"
            );

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize Prometheus metrics");
            None
        }
    }
}

fn builder_for(config: &MetricsConfig) -> Result<PrometheusBuilder, BuildError> {
    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key.as_str(), value.as_str());
    }

    let buckets = config.buckets();
    if buckets.is_empty() {
        return Ok(builder);
    }
    builder.set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), &buckets)
}

pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// Any HTTP request served, gateway or not
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());

    if status >= 500 {
        counter!("http_server_errors_total", &labels).increment(1);
    }
}

/// Terminal outcome of one pass through the gateway pipeline
pub fn record_gateway_request(outcome: &str, tier: Option<&str>) {
    counter!(
        "gateway_requests_total",
        "outcome" => outcome.to_string(),
        "tier" => tier.unwrap_or("none").to_string()
    )
    .increment(1);
}

pub fn record_rate_limit_decision(tier: &str, algorithm: &str, allowed: bool) {
    counter!(
        "rate_limit_decisions_total",
        "tier" => tier.to_string(),
        "algorithm" => algorithm.to_string(),
        "decision" => if allowed { "admit" } else { "reject" }
    )
    .increment(1);
}

pub fn record_rate_limit_store_error(store: &str) {
    counter!("rate_limit_store_errors_total", "store" => store.to_string()).increment(1);
}

/// `layer` is "l1" or "l2"
pub fn record_cache_lookup(layer: &'static str, hit: bool) {
    counter!(
        "cache_lookups_total",
        "layer" => layer,
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

pub fn record_cache_error(operation: &'static str) {
    counter!("cache_l2_errors_total", "operation" => operation).increment(1);
}

pub fn record_backend_call(target: &str, status: Option<u16>, duration: Duration) {
    let status = status.map_or_else(|| "error".to_string(), |s| s.to_string());
    let labels = [("target", target.to_string()), ("status", status)];

    counter!("backend_requests_total", &labels).increment(1);
    histogram!("backend_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Collapse ids out of a path so label cardinality stays bounded
fn sanitize_path(path: &str) -> String {
    let path = UUID_SEGMENT.replace_all(path, "{id}");
    let path = NUMERIC_SEGMENT.replace_all(&path, "/{id}$1");

    path.chars().take(MAX_PATH_LABEL).collect()
}
