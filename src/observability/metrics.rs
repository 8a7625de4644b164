//! Prometheus metrics for grpc_health_proxy.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use tracing::warn;

use super::{MetricsRecorder, ProbePhase};

/// Distinct `service_name` label values tracked before folding new ones
/// into [`OTHER_SERVICE_LABEL`].
pub const MAX_SERVICE_LABELS: usize = 256;

/// Label for service names past [`MAX_SERVICE_LABELS`].
pub const OTHER_SERVICE_LABEL: &str = "__other__";

/// Prometheus registry with all proxy metrics.
pub struct Metrics {
    registry: Registry,

    /// Service names seen so far; query parameters are client-controlled
    services: Mutex<HashSet<String>>,

    /// HTTP health request duration by path
    pub http_request_duration_seconds: HistogramVec,

    /// Whole probe duration by service
    pub probe_duration_seconds: HistogramVec,

    /// Connect / call phase duration by service
    pub probe_phase_duration_seconds: HistogramVec,

    /// Probe results by result code and service
    pub probe_results_total: CounterVec,
}

impl Metrics {
    /// Create a new registry with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Probe latency buckets (in seconds)
        let buckets = vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ];

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "grpc_health_check_seconds",
                "Duration of HTTP health check requests in seconds",
            )
            .buckets(buckets.clone()),
            &["path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "grpc_health_check_service_duration_seconds",
                "Duration of gRPC health probes per service in seconds",
            )
            .buckets(buckets.clone()),
            &["service_name"],
        )?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;

        let probe_phase_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "grpc_health_check_phase_duration_seconds",
                "Duration of gRPC health probe phases (connect, call) in seconds",
            )
            .buckets(buckets),
            &["service_name", "phase"],
        )?;
        registry.register(Box::new(probe_phase_duration_seconds.clone()))?;

        let probe_results_total = CounterVec::new(
            Opts::new(
                "grpc_health_check_service_requests",
                "gRPC health probes by result code and service",
            ),
            &["code", "service_name"],
        )?;
        registry.register(Box::new(probe_results_total.clone()))?;

        Ok(Self {
            registry,
            services: Mutex::new(HashSet::new()),
            http_request_duration_seconds,
            probe_duration_seconds,
            probe_phase_duration_seconds,
            probe_results_total,
        })
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Content type of [`export`](Self::export) output.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Label value for `service_name`, bounded by [`MAX_SERVICE_LABELS`].
    fn service_label<'a>(&self, service_name: &'a str) -> &'a str {
        let mut services = self.services.lock().unwrap_or_else(|e| e.into_inner());
        if services.contains(service_name) {
            return service_name;
        }
        if services.len() < MAX_SERVICE_LABELS {
            services.insert(service_name.to_string());
            return service_name;
        }
        OTHER_SERVICE_LABEL
    }

    /// Get the Prometheus registry (for custom metrics).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl MetricsRecorder for Metrics {
    fn observe_phase(&self, service_name: &str, phase: ProbePhase, elapsed: Duration) {
        let service_name = self.service_label(service_name);
        self.probe_phase_duration_seconds
            .with_label_values(&[service_name, phase.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    fn record_result(&self, service_name: &str, result: &str, elapsed: Duration) {
        let service_name = self.service_label(service_name);
        self.probe_results_total
            .with_label_values(&[result, service_name])
            .inc();
        self.probe_duration_seconds
            .with_label_values(&[service_name])
            .observe(elapsed.as_secs_f64());
    }

    fn observe_request(&self, path: &str, elapsed: Duration) {
        self.http_request_duration_seconds
            .with_label_values(&[path])
            .observe(elapsed.as_secs_f64());
    }
}
