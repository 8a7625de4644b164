//! Server error types.

use std::fmt;
use std::io;

/// Errors that stop the HTTP side of the proxy.
#[derive(Debug)]
pub enum ServerError {
    /// A listener could not be bound (address in use, bad TLS material...).
    Bind {
        listener: &'static str,
        addr: String,
        error: io::Error,
    },
    /// A listener stopped accepting connections.
    Accept {
        listener: &'static str,
        error: io::Error,
    },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Bind {
                listener,
                addr,
                error,
            } => write!(f, "failed to start {} listener on {}: {}", listener, addr, error),
            ServerError::Accept { listener, error } => {
                write!(f, "{} listener failed: {}", listener, error)
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { error, .. } | ServerError::Accept { error, .. } => Some(error),
        }
    }
}
