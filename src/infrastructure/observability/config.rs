//! `[observability]` settings: span export and the Prometheus recorder

use std::collections::BTreeMap;

use serde::Deserialize;

/// Histogram buckets (seconds) for every `*_duration_seconds` series.
/// Skewed low: a cache hit never leaves the process.
pub const DEFAULT_LATENCY_BUCKETS: [f64; 12] = [
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub tracing: TracingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Export spans over OTLP/gRPC
    pub enabled: bool,
    pub otlp_endpoint: String,
    pub service_name: String,
    /// Fraction of traces kept; out-of-range values clamp
    pub sampling_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "edge-gateway".to_string(),
            sampling_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Mounted beside the admin and health routes, ahead of the catch-all
    pub path: String,
    pub latency_buckets: Vec<f64>,
    /// Added to every series, e.g. `instance` or `region`
    pub global_labels: BTreeMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
            latency_buckets: DEFAULT_LATENCY_BUCKETS.to_vec(),
            global_labels: BTreeMap::new(),
        }
    }
}

impl MetricsConfig {
    /// Positive finite buckets, ascending, without duplicates
    pub fn buckets(&self) -> Vec<f64> {
        let mut buckets: Vec<f64> = self
            .latency_buckets
            .iter()
            .copied()
            .filter(|b| b.is_finite() && *b > 0.0)
            .collect();
        buckets.sort_by(f64::total_cmp);
        buckets.dedup();
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObservabilityConfig::default();

        assert!(!config.tracing.enabled);
        assert_eq!(config.tracing.service_name, "edge-gateway");
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.path, "/metrics");
        assert_eq!(config.metrics.buckets(), DEFAULT_LATENCY_BUCKETS.to_vec());
        assert!(config.metrics.global_labels.is_empty());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: ObservabilityConfig = serde_json::from_str(
            r#"{"tracing": {"sampling_ratio": 0.25}, "metrics": {"global_labels": {"instance": "edge-1"}}}"#,
        )
        .unwrap();

        assert_eq!(config.tracing.sampling_ratio, 0.25);
        assert_eq!(config.tracing.otlp_endpoint, "http://localhost:4317");
        assert_eq!(config.metrics.global_labels["instance"], "edge-1");
        assert_eq!(config.metrics.latency_buckets.len(), DEFAULT_LATENCY_BUCKETS.len());
    }

    #[test]
    fn test_buckets_are_normalized() {
        let config = MetricsConfig {
            latency_buckets: vec![0.5, 0.01, -1.0, 0.5, f64::INFINITY, 0.0, 2.0],
            ..Default::default()
        };

        assert_eq!(config.buckets(), vec![0.01, 0.5, 2.0]);
    }
}
