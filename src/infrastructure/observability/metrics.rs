//! Prometheus metrics infrastructure

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::MetricsConfig;

const MAX_PATH_LABEL_LENGTH: usize = 50;

/// Numeric ids and prefixed entity ids such as `key_3ZfzKxvGdWcR7mQ2bTnA9p`
static ID_SEGMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+|[a-z]+_[A-Za-z0-9]{16,})$").expect("valid id pattern"));

/// Prometheus metrics handle for serving metrics endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Get the metrics as a string for the /metrics endpoint
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialize Prometheus metrics
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("keygate_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

            tracing::info!("Prometheus metrics initialized at {}", config.path);

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Create the metrics router
pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// Record an HTTP request metric
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

/// Record the outcome code of a key verification
pub fn record_verification(code: &'static str) {
    counter!("keygate_verifications_total", "code" => code).increment(1);
}

/// Record a single rate limit decision
pub fn record_ratelimit_decision(passed: bool) {
    let passed = if passed { "true" } else { "false" };
    counter!("keygate_ratelimit_decisions_total", "passed" => passed).increment(1);
}

/// Replace id-like segments with `{id}` and cap the length to bound label cardinality
fn sanitize_path(path: &str) -> String {
    let sanitized = path
        .split('/')
        .map(|segment| {
            if ID_SEGMENT_PATTERN.is_match(segment) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    match sanitized.char_indices().nth(MAX_PATH_LABEL_LENGTH) {
        Some((end, _)) => sanitized[..end].to_string(),
        None => sanitized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path_prefixed_id() {
        let path = "/v1/keys/key_3ZfzKxvGdWcR7mQ2bTnA9p";
        assert_eq!(sanitize_path(path), "/v1/keys/{id}");
    }

    #[test]
    fn test_sanitize_path_numeric_id() {
        assert_eq!(sanitize_path("/api/users/123/orders"), "/api/users/{id}/orders");
        assert_eq!(sanitize_path("/api/123/456"), "/api/{id}/{id}");
    }

    #[test]
    fn test_sanitize_path_keeps_short_or_mixed_segments() {
        assert_eq!(sanitize_path("/v1/key_short"), "/v1/key_short");
        assert_eq!(sanitize_path("/v1/v2beta"), "/v1/v2beta");
    }

    #[test]
    fn test_sanitize_path_keeps_rpc_routes() {
        assert_eq!(sanitize_path("/v1/keys.verifyKey"), "/v1/keys.verifyKey");
        assert_eq!(sanitize_path("/health"), "/health");
    }

    #[test]
    fn test_sanitize_path_truncates_long_paths() {
        let path = "/very/long/path/that/exceeds/the/maximum/allowed/length/for/metrics";
        assert!(sanitize_path(path).len() <= MAX_PATH_LABEL_LENGTH);
    }
}
