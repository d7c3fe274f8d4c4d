//! Prometheus metrics for the triage engine.
//!
//! Covers the online path (triage requests, the external assessor, ensemble
//! decisions, encoding fallbacks) and the offline training harness.
//!
//! # Example
//! ```no_run
//! use triage_engine::metrics::TRIAGE_REQUESTS_TOTAL;
//!
//! TRIAGE_REQUESTS_TOTAL.with_label_values(&["fused"]).inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};

const NAMESPACE: &str = "triage_engine";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Triage Metrics
    // ============================================================================

    /// Triage requests by outcome
    ///
    /// Labels: outcome (fused, degraded, failed)
    pub static ref TRIAGE_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("triage_requests_total", "Total number of triage requests")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create TRIAGE_REQUESTS_TOTAL metric");

    /// End-to-end triage duration in seconds
    pub static ref TRIAGE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("triage_duration_seconds", "Triage request duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    ).expect("Failed to create TRIAGE_DURATION_SECONDS metric");

    /// Duration of each triage stage in seconds
    ///
    /// Labels: stage (encode, ensemble, assessor, fusion)
    pub static ref STAGE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("stage_duration_seconds", "Triage stage duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0]),
        &["stage"]
    ).expect("Failed to create STAGE_DURATION_SECONDS metric");

    /// Ensemble decisions by triage score
    ///
    /// Labels: score
    pub static ref ENSEMBLE_VOTES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("ensemble_votes_total", "Ensemble decisions by triage score")
            .namespace(NAMESPACE),
        &["score"]
    ).expect("Failed to create ENSEMBLE_VOTES_TOTAL metric");

    /// Categorical intake values that fell back to the unspecified code
    ///
    /// Labels: field
    pub static ref ENCODING_FALLBACKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("encoding_fallbacks_total", "Unrecognized categorical intake values")
            .namespace(NAMESPACE),
        &["field"]
    ).expect("Failed to create ENCODING_FALLBACKS_TOTAL metric");

    // ============================================================================
    // Assessor Metrics
    // ============================================================================

    /// External assessor calls by status
    ///
    /// Labels: status (success, unavailable, timeout, malformed_response)
    pub static ref ASSESSOR_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("assessor_requests_total", "Total number of external assessor calls")
            .namespace(NAMESPACE),
        &["status"]
    ).expect("Failed to create ASSESSOR_REQUESTS_TOTAL metric");

    /// External assessor call duration in seconds
    pub static ref ASSESSOR_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("assessor_duration_seconds", "External assessor call duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0]),
    ).expect("Failed to create ASSESSOR_DURATION_SECONDS metric");

    // ============================================================================
    // Training Metrics
    // ============================================================================

    /// Training rows left out
    ///
    /// Labels: reason
    pub static ref TRAINING_ROWS_EXCLUDED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("training_rows_excluded_total", "Training rows excluded before the split")
            .namespace(NAMESPACE),
        &["reason"]
    ).expect("Failed to create TRAINING_ROWS_EXCLUDED_TOTAL metric");

    /// Held-out exact-match accuracy of the last training run
    ///
    /// Labels: model
    pub static ref MODEL_ACCURACY: GaugeVec = GaugeVec::new(
        Opts::new("model_accuracy", "Held-out accuracy of the loaded artifact")
            .namespace(NAMESPACE),
        &["model"]
    ).expect("Failed to create MODEL_ACCURACY metric");

    // ============================================================================
    // Error Metrics
    // ============================================================================

    /// Errors returned to callers
    ///
    /// Labels: error_code
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("errors_total", "Total number of errors returned to callers")
            .namespace(NAMESPACE),
        &["error_code"]
    ).expect("Failed to create ERRORS_TOTAL metric");

    /// Build information
    ///
    /// Labels: version
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Build information").namespace(NAMESPACE),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");
}

fn register<C: prometheus::core::Collector + 'static>(collector: C) -> Result<(), prometheus::Error> {
    match PROMETHEUS_REGISTRY.register(Box::new(collector)) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Initialize all metrics.
///
/// Registers every metric with the Prometheus registry. Calling it again is a no-op.
///
/// # Errors
///
/// Returns an error if a metric descriptor is rejected by the registry.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    // Triage metrics
    register(TRIAGE_REQUESTS_TOTAL.clone())?;
    register(TRIAGE_DURATION_SECONDS.clone())?;
    register(STAGE_DURATION_SECONDS.clone())?;
    register(ENSEMBLE_VOTES_TOTAL.clone())?;
    register(ENCODING_FALLBACKS_TOTAL.clone())?;

    // Assessor metrics
    register(ASSESSOR_REQUESTS_TOTAL.clone())?;
    register(ASSESSOR_DURATION_SECONDS.clone())?;

    // Training metrics
    register(TRAINING_ROWS_EXCLUDED_TOTAL.clone())?;
    register(MODEL_ACCURACY.clone())?;

    // Error and system metrics
    register(ERRORS_TOTAL.clone())?;
    register(BUILD_INFO.clone())?;

    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Render all registered metrics in the Prometheus text format
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
    fn test_triage_counter() {
        TRIAGE_REQUESTS_TOTAL.with_label_values(&["degraded"]).inc();
        let value = TRIAGE_REQUESTS_TOTAL.with_label_values(&["degraded"]).get();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().unwrap();
        BUILD_INFO.with_label_values(&[env!("CARGO_PKG_VERSION")]).set(1.0);
        let metrics = gather_metrics();
        assert!(metrics.contains("triage_engine_build_info"));
    }
}
