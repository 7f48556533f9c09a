//! Observability infrastructure - Tracing, Metrics, and Logging

mod config;
mod metrics;
mod tracing_setup;

pub use self::config::{MetricsConfig, ObservabilityConfig, TracingConfig};
pub use self::metrics::{
    create_metrics_router, init_metrics, record_backend_call, record_cache_error,
    record_cache_lookup, record_gateway_request, record_http_request, record_rate_limit_decision,
    record_rate_limit_store_error, PrometheusMetrics,
};
pub use tracing_setup::{init_tracing, shutdown_tracing};
