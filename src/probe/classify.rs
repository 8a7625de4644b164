//! Raw failure classification.

use tonic::Code;

use super::error::{Failure, ProbeError, RawProbeError};

/// Map a raw probe failure onto the closed [`ProbeError`] taxonomy.
///
/// First match wins:
///
/// | raw condition                       | kind              |
/// |-------------------------------------|-------------------|
/// | any connect-phase failure           | ConnectionFailure |
/// | call status `Unimplemented`         | Unimplemented     |
/// | call status `DeadlineExceeded`      | RpcFailure        |
/// | call status `NotFound`              | ServiceNotFound   |
/// | any other call status               | UnknownFailure    |
pub fn classify(service_name: &str, raw: RawProbeError) -> ProbeError {
    let message = match &raw {
        RawProbeError::Call(status) if status.code() == Code::Unimplemented => {
            "the server does not implement the grpc health protocol (grpc.health.v1.Health)"
                .to_string()
        }
        RawProbeError::Call(status) if status.code() == Code::DeadlineExceeded => {
            "health rpc did not complete within the rpc timeout".to_string()
        }
        _ => raw.to_string(),
    };

    let code = raw.code();
    let failure = Failure {
        service_name: service_name.to_string(),
        message,
        raw,
    };

    match code {
        None => ProbeError::ConnectionFailure(failure),
        Some(Code::Unimplemented) => ProbeError::Unimplemented(failure),
        Some(Code::DeadlineExceeded) => ProbeError::RpcFailure(failure),
        Some(Code::NotFound) => ProbeError::ServiceNotFound(failure),
        Some(_) => ProbeError::UnknownFailure(failure),
    }
}
