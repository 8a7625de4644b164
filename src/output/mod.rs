//! Output adapters.
//!
//! Both adapters render the same [`ProbeResult`](crate::probe::ProbeResult)
//! and are kept mapping-consistent: a result is a success in one vocabulary
//! exactly when it is a success in the other.

mod exit_code;
mod http;

pub use self::exit_code::{
    exit_code, EXIT_CONNECTION_FAILURE, EXIT_RPC_FAILURE, EXIT_SERVICE_NOT_FOUND, EXIT_SERVING,
    EXIT_STARTUP_FAILURE, EXIT_UNHEALTHY, EXIT_UNIMPLEMENTED,
};
pub use self::http::{render, HealthResponse, CONTENT_TYPE};
