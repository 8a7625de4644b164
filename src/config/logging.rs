//! Logging configuration.

use std::path::PathBuf;

use super::parse::{env_bool, env_opt, env_or};
use super::ConfigError;

/// Logging configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log level filter (from LOG_LEVEL, LOG_DEBUG or RUST_LOG).
    pub filter: String,
    /// Service name for structured logging.
    pub service_name: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Append logs to this file instead of stdout.
    pub target: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "grpc_health_proxy=info".to_string(),
            service_name: "grpc_health_proxy".to_string(),
            json: false,
            target: None,
        }
    }
}

impl LoggingConfig {
    /// Load configuration from environment variables.
    ///
    /// Priority: LOG_LEVEL > LOG_DEBUG > RUST_LOG > default
    ///
    /// LOG_LEVEL accepts simple values: trace, debug, info, warn, error
    /// RUST_LOG accepts full tracing filter syntax: grpc_health_proxy=debug,h2=warn
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            filter: Self::resolve_log_filter()?,
            service_name: env_or("LOG_SERVICE_NAME", "grpc_health_proxy"),
            json: env_bool("LOG_JSON", false),
            target: env_opt("LOG_TARGET").map(PathBuf::from),
        })
    }

    /// Resolve log filter from environment.
    fn resolve_log_filter() -> Result<String, ConfigError> {
        if let Some(level) = env_opt("LOG_LEVEL") {
            let level = level.to_lowercase();
            return match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => {
                    Ok(format!("grpc_health_proxy={}", level))
                }
                _ => Err(ConfigError::invalid(
                    "LOG_LEVEL",
                    format!("'{}', expected: trace, debug, info, warn, error", level),
                )),
            };
        }

        if env_bool("LOG_DEBUG", false) {
            return Ok("grpc_health_proxy=debug".to_string());
        }

        if let Some(filter) = env_opt("RUST_LOG") {
            return Ok(filter);
        }

        Ok("grpc_health_proxy=info".to_string())
    }
}
