//! Probe error types.
//!
//! A probe fails in one of two phases. [`RawProbeError`] records the phase
//! and the underlying cause exactly as observed; [`ProbeError`] is the closed
//! taxonomy the output adapters consume (see [`classify`](super::classify)).

use std::fmt;
use std::time::Duration;

use tonic::Code;

use super::ServingStatus;

/// Connect-phase failure cause.
#[derive(Debug)]
pub enum ConnectError {
    /// The connect budget elapsed before the connection was ready.
    Timeout(Duration),
    /// The target address cannot be turned into an endpoint.
    InvalidAddress { addr: String, error: String },
    /// TCP, TLS, or HTTP/2 handshake failure (refused, reset, bad certificate...).
    Transport(tonic::transport::Error),
    /// The ambient cancellation token fired.
    Cancelled,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::Timeout(budget) => write!(f, "timed out after {:?}", budget),
            ConnectError::InvalidAddress { addr, error } => {
                write!(f, "invalid address '{}': {}", addr, error)
            }
            ConnectError::Transport(e) => f.write_str(&error_chain(e)),
            ConnectError::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Raw probe failure tagged with the phase it happened in.
#[derive(Debug)]
pub enum RawProbeError {
    /// Failure while establishing the connection.
    Connect { addr: String, error: ConnectError },
    /// Failure status returned by (or synthesised for) the Check call.
    Call(tonic::Status),
}

impl RawProbeError {
    /// Protocol status code of a call-phase failure.
    pub fn code(&self) -> Option<Code> {
        match self {
            RawProbeError::Connect { .. } => None,
            RawProbeError::Call(status) => Some(status.code()),
        }
    }
}

impl fmt::Display for RawProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawProbeError::Connect { addr, error } => {
                write!(f, "failed to connect to {}: {}", addr, error)
            }
            RawProbeError::Call(status) if status.message().is_empty() => {
                write!(f, "health rpc failed: {:?}", status.code())
            }
            RawProbeError::Call(status) => {
                write!(f, "health rpc failed: {:?}: {}", status.code(), status.message())
            }
        }
    }
}

impl std::error::Error for RawProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RawProbeError::Connect {
                error: ConnectError::Transport(e),
                ..
            } => Some(e),
            RawProbeError::Call(status) => Some(status),
            _ => None,
        }
    }
}

/// Details shared by every [`ProbeError`] kind.
#[derive(Debug)]
pub struct Failure {
    /// Service name that was probed (empty for overall status).
    pub service_name: String,
    /// Human-readable reason.
    pub message: String,
    /// Originating raw error, kept for logging.
    pub raw: RawProbeError,
}

/// Classified probe failure.
#[derive(Debug)]
pub enum ProbeError {
    /// The connection could not be established in time.
    ConnectionFailure(Failure),
    /// The RPC did not complete in time.
    RpcFailure(Failure),
    /// The peer does not know the requested service.
    ServiceNotFound(Failure),
    /// The peer does not implement `grpc.health.v1.Health`.
    Unimplemented(Failure),
    /// Any other RPC failure.
    UnknownFailure(Failure),
}

impl ProbeError {
    /// Name of the error kind, as used in response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::ConnectionFailure(_) => "ConnectionFailure",
            ProbeError::RpcFailure(_) => "RPCFailure",
            ProbeError::ServiceNotFound(_) => "ServiceNotFound",
            ProbeError::Unimplemented(_) => "Unimplemented",
            ProbeError::UnknownFailure(_) => "UnknownFailure",
        }
    }

    pub fn failure(&self) -> &Failure {
        match self {
            ProbeError::ConnectionFailure(f)
            | ProbeError::RpcFailure(f)
            | ProbeError::ServiceNotFound(f)
            | ProbeError::Unimplemented(f)
            | ProbeError::UnknownFailure(f) => f,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.failure().service_name
    }

    pub fn message(&self) -> &str {
        &self.failure().message
    }

    pub fn raw(&self) -> &RawProbeError {
        &self.failure().raw
    }

    /// Serving status implied by the failure.
    ///
    /// A reachable peer that does not know the service reports
    /// `ServiceUnknown`; every other failure leaves the status `Unknown`.
    pub fn serving_status(&self) -> ServingStatus {
        match self {
            ProbeError::ServiceNotFound(_) => ServingStatus::ServiceUnknown,
            _ => ServingStatus::Unknown,
        }
    }

    /// Label recorded in the result counter.
    pub fn result_label(&self) -> &'static str {
        match self.raw() {
            RawProbeError::Connect { .. } => "ConnectionFailure",
            RawProbeError::Call(status) => match status.code() {
                Code::Unimplemented => "Unimplemented",
                Code::DeadlineExceeded => "DeadlineExceeded",
                Code::NotFound => "NotFound",
                _ => "Unknown",
            },
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.raw())
    }
}

/// Result of one probe: exactly one of outcome or classified error.
pub type ProbeResult = Result<ServingStatus, ProbeError>;

/// Render an error with its `source()` chain, e.g. `transport error: tcp connect error: Connection refused`.
pub(crate) fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
