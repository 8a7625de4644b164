//! Configuration module for grpc_health_proxy.
//!
//! This module provides centralized configuration loading from environment variables.
//! Everything is read and validated once at startup; the resulting values are
//! immutable and passed explicitly to the components that need them.
//!
//! # Example
//!
//! ```rust,ignore
//! use grpc_health_proxy::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Target: {}", config.probe.addr);
//! ```

mod error;
mod logging;
pub(crate) mod parse;
mod probe;
mod server;

pub use error::ConfigError;
pub use logging::LoggingConfig;
pub use probe::{ProbeConfig, ProbeTlsConfig, TlsMode, DEFAULT_USER_AGENT};
pub use server::{HttpsConfig, ServerConfig};

use parse::env_bool;

/// Execution mode of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Run one probe and exit with the translated exit code.
    Cli,
    /// Serve health results over HTTP until shut down.
    Server,
}

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Execution mode (RUN_CLI).
    pub mode: RunMode,
    /// Probe target configuration.
    pub probe: ProbeConfig,
    /// HTTP listener configuration (unused in CLI mode).
    pub server: ServerConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = if env_bool("RUN_CLI", false) {
            RunMode::Cli
        } else {
            RunMode::Server
        };

        let server = match mode {
            RunMode::Server => ServerConfig::from_env()?,
            RunMode::Cli => ServerConfig::default(),
        };

        Ok(Self {
            mode,
            probe: ProbeConfig::from_env()?,
            server,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::{info, warn};

        let tls = &self.probe.tls;

        info!("Configuration loaded:");
        info!(
            addr = %self.probe.addr,
            connect_timeout = ?self.probe.connect_timeout,
            rpc_timeout = ?self.probe.rpc_timeout,
            "  Target"
        );
        info!(
            service_name = self.probe.service_name.as_deref().unwrap_or(""),
            user_agent = %self.probe.user_agent,
            "  Probe"
        );
        info!(
            mode = %tls.mode,
            ca_cert = ?tls.ca_cert,
            client_cert = ?tls.client_cert,
            client_key = ?tls.client_key,
            sni_server_name = tls.sni_server_name.as_deref().unwrap_or(""),
            "  gRPC TLS"
        );

        if tls.mode == TlsMode::NoVerify {
            warn!("gRPC TLS certificate verification disabled (INSECURE)");
        } else if tls.mode == TlsMode::Plaintext {
            info!("  gRPC transport: plaintext (INSECURE)");
        }

        match self.mode {
            RunMode::Cli => info!("  Mode: cli"),
            RunMode::Server => {
                info!(
                    listen_addr = %self.server.listen_addr,
                    listen_path = %self.server.listen_path,
                    "  Health listener"
                );
                info!(
                    metrics_addr = %self.server.metrics_addr,
                    metrics_path = %self.server.metrics_path,
                    "  Metrics listener"
                );
                if let Some(ref https) = self.server.https {
                    info!(
                        cert = %https.cert_path.display(),
                        key = %https.key_path.display(),
                        client_ca = ?https.client_ca_path,
                        verify_client = https.verify_client,
                        "  HTTPS: enabled"
                    );
                }
            }
        }
    }
}
