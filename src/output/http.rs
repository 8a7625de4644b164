//! HTTP rendering of probe results.

use http::StatusCode;

use crate::probe::{ProbeError, ProbeResult, ServingStatus};

/// Content type of every health response body.
pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Status line and body for one health request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Render a probe result for `service_name`.
///
/// Outcomes produce `<service> <STATUS>`; `ServiceNotFound` produces
/// `<service> ServiceNotFound`; every other error produces
/// `<service> <Kind>: <reason>`.
pub fn render(service_name: &str, result: &ProbeResult) -> HealthResponse {
    match result {
        Ok(status) => HealthResponse {
            status: match status {
                ServingStatus::Serving => StatusCode::OK,
                ServingStatus::ServiceUnknown => StatusCode::NOT_FOUND,
                ServingStatus::NotServing | ServingStatus::Unknown => StatusCode::BAD_GATEWAY,
            },
            body: format!("{} {}", service_name, status),
        },
        Err(e @ ProbeError::ServiceNotFound(_)) => HealthResponse {
            status: StatusCode::NOT_FOUND,
            body: format!("{} {}", service_name, e.kind()),
        },
        Err(e) => HealthResponse {
            status: match e {
                ProbeError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
                _ => StatusCode::BAD_GATEWAY,
            },
            body: format!("{} {}", service_name, e),
        },
    }
}
