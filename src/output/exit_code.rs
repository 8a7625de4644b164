//! Process exit codes for one-shot mode.

use crate::probe::{ProbeError, ProbeResult};

pub const EXIT_SERVING: i32 = 0;
pub const EXIT_CONNECTION_FAILURE: i32 = 1;
pub const EXIT_RPC_FAILURE: i32 = 2;
pub const EXIT_SERVICE_NOT_FOUND: i32 = 3;
pub const EXIT_UNIMPLEMENTED: i32 = 4;
/// Not serving, unknown status, or an unclassified RPC failure.
pub const EXIT_UNHEALTHY: i32 = 5;
/// Configuration, credential, logging or listener setup failed.
pub const EXIT_STARTUP_FAILURE: i32 = 255;

/// Exit code for a probe result.
pub fn exit_code(result: &ProbeResult) -> i32 {
    match result {
        Ok(status) if status.is_serving() => EXIT_SERVING,
        Ok(_) => EXIT_UNHEALTHY,
        Err(ProbeError::ConnectionFailure(_)) => EXIT_CONNECTION_FAILURE,
        Err(ProbeError::RpcFailure(_)) => EXIT_RPC_FAILURE,
        Err(ProbeError::ServiceNotFound(_)) => EXIT_SERVICE_NOT_FOUND,
        Err(ProbeError::Unimplemented(_)) => EXIT_UNIMPLEMENTED,
        Err(ProbeError::UnknownFailure(_)) => EXIT_UNHEALTHY,
    }
}
