//! Prometheus metrics for the prediction service.
//!
//! Covers HTTP traffic, prediction outcomes and latency, risk warnings and
//! the identity of the loaded model. Exported on `/metrics`.
//!
//! # Example
//! ```no_run
//! use failure_predictor::metrics::PREDICTIONS_TOTAL;
//!
//! PREDICTIONS_TOTAL.with_label_values(&["No Failure"]).inc();
//! ```

mod middleware;

pub use middleware::track_http;

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, Counter, CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
};

const NAMESPACE: &str = "failure_predictor";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Total number of HTTP requests received
    ///
    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// HTTP request duration in seconds
    ///
    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // Prediction Metrics
    // ============================================================================

    /// Total number of successful predictions
    ///
    /// Labels: label
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of successful predictions")
            .namespace(NAMESPACE),
        &["label"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Total number of failed predictions
    ///
    /// Labels: error_code
    pub static ref PREDICTION_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("prediction_errors_total", "Total number of failed predictions")
            .namespace(NAMESPACE),
        &["error_code"]
    ).expect("Failed to create PREDICTION_ERRORS_TOTAL metric");

    /// Prediction duration in seconds, reconciliation included
    ///
    /// Labels: model_type
    pub static ref PREDICTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "prediction_duration_seconds",
            "Prediction duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        &["model_type"]
    ).expect("Failed to create PREDICTION_DURATION_SECONDS metric");

    /// Predictions whose aggregate failure risk exceeded the threshold
    pub static ref RISK_WARNINGS_TOTAL: Counter = Counter::with_opts(
        Opts::new("risk_warnings_total", "Predictions whose aggregate failure risk exceeded the threshold")
            .namespace(NAMESPACE)
    ).expect("Failed to create RISK_WARNINGS_TOTAL metric");

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Loaded model identity (always 1)
    ///
    /// Labels: name, model_type, digest
    pub static ref MODEL_INFO: GaugeVec = GaugeVec::new(
        Opts::new("model_info", "Loaded model identity")
            .namespace(NAMESPACE),
        &["name", "model_type", "digest"]
    ).expect("Failed to create MODEL_INFO metric");

    /// Build information
    ///
    /// Labels: version
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Build information")
            .namespace(NAMESPACE),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");
}

fn register<C: Collector + Clone + 'static>(collector: &C) -> Result<(), prometheus::Error> {
    match PROMETHEUS_REGISTRY.register(Box::new(collector.clone())) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    register(&*HTTP_REQUESTS_TOTAL)?;
    register(&*HTTP_REQUEST_DURATION_SECONDS)?;

    register(&*PREDICTIONS_TOTAL)?;
    register(&*PREDICTION_ERRORS_TOTAL)?;
    register(&*PREDICTION_DURATION_SECONDS)?;
    register(&*RISK_WARNINGS_TOTAL)?;

    register(&*MODEL_INFO)?;
    register(&*BUILD_INFO)?;

    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Generate Prometheus text format metrics
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_prediction_counter() {
        PREDICTIONS_TOTAL.with_label_values(&["Power Failure"]).inc();

        let value = PREDICTIONS_TOTAL
            .with_label_values(&["Power Failure"])
            .get();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().unwrap();
        let metrics = gather_metrics();
        assert!(metrics.contains("failure_predictor_build_info"));
    }
}
