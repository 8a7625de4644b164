//! Observability: probe and HTTP metrics.
//!
//! The probe core only sees the [`MetricsRecorder`] trait. The process wires
//! in the Prometheus-backed [`Metrics`]; tests and embedders that do not care
//! about telemetry pass [`NoopRecorder`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use grpc_health_proxy::observability::{Metrics, MetricsRecorder};
//!
//! let metrics = Metrics::new()?;
//! metrics.record_result("echo.EchoServer", "SERVING", elapsed);
//! println!("{}", metrics.export());
//! ```

pub mod metrics;

use std::time::Duration;

pub use metrics::Metrics;

/// Phase of a probe, used as the `phase` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    Connect,
    Call,
}

impl ProbePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbePhase::Connect => "connect",
            ProbePhase::Call => "call",
        }
    }
}

/// Sink for probe observations.
///
/// Implementations are shared between concurrent probes and must be safe
/// for concurrent use.
pub trait MetricsRecorder: Send + Sync {
    /// Duration of one probe phase.
    fn observe_phase(&self, service_name: &str, phase: ProbePhase, elapsed: Duration);

    /// Final result of one probe with its total duration.
    fn record_result(&self, service_name: &str, result: &str, elapsed: Duration);

    /// Duration of one HTTP health request.
    fn observe_request(&self, path: &str, elapsed: Duration);
}

/// Recorder that drops every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn observe_phase(&self, _service_name: &str, _phase: ProbePhase, _elapsed: Duration) {}

    fn record_result(&self, _service_name: &str, _result: &str, _elapsed: Duration) {}

    fn observe_request(&self, _path: &str, _elapsed: Duration) {}
}
