//! grpc_health_proxy - gRPC health checks as exit codes and HTTP responses.
//!
//! The proxy runs `grpc.health.v1.Health/Check` against one target and
//! translates the outcome for callers that do not speak gRPC:
//!
//! - **One-shot mode** (`RUN_CLI=true`): probe once, exit with a code that
//!   names the failure class (see [`output::exit_code`]).
//! - **Server mode**: answer every HTTP request on the health path with a
//!   fresh probe, rendered as a status code and a plain-text body.
//!
//! # Architecture
//!
//! ```text
//!  config ──► CredentialBuilder ──► Prober ──► classify ──► output adapters
//!                                     ▲
//!  listener ──► server::HealthService ┘        observability (Prometheus)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use grpc_health_proxy::config::ProbeConfig;
//! use grpc_health_proxy::observability::NoopRecorder;
//! use grpc_health_proxy::probe::{CredentialBuilder, Prober};
//!
//! let config = ProbeConfig::new("localhost:50051");
//! let credentials = CredentialBuilder::build(&config.tls)?;
//! let prober = Prober::new(Arc::new(config), Arc::new(credentials), Arc::new(NoopRecorder));
//! let result = prober.check(&CancellationToken::new(), "echo.EchoServer").await;
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (8 chars) with optional "-dirty" suffix
pub const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Full version string: "0.1.0 (abc12345)" or "0.1.0 (abc12345-dirty)"
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_VERSION"), ")");

pub mod config;
pub mod example;
pub mod listener;
pub mod logging;
pub mod observability;
pub mod output;
pub mod probe;
pub mod server;

// Re-exports for convenience
pub use config::Config;
pub use probe::{ProbeError, ProbeResult, Prober, ServingStatus};
pub use server::Server;
