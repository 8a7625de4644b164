//! HTTP listener configuration (server mode).

use std::path::PathBuf;

use super::parse::{env_bool, env_opt, env_or};
use super::ConfigError;

/// HTTPS settings for the health listener.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpsConfig {
    /// Server certificate chain (PEM).
    pub cert_path: PathBuf,
    /// Server private key (PEM).
    pub key_path: PathBuf,
    /// CA used to verify client certificates.
    pub client_ca_path: Option<PathBuf>,
    /// Reject clients that do not present a certificate signed by `client_ca_path`.
    pub verify_client: bool,
}

/// Server configuration loaded from environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Health listener address (default: 127.0.0.1:8080).
    pub listen_addr: String,
    /// Path serving health results (default: /).
    pub listen_path: String,
    /// Metrics listener address (default: 127.0.0.1:9000).
    pub metrics_addr: String,
    /// Path serving Prometheus metrics (default: /metrics).
    pub metrics_path: String,
    /// HTTPS configuration; plain HTTP when `None`.
    pub https: Option<HttpsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            listen_path: "/".to_string(),
            metrics_addr: "127.0.0.1:9000".to_string(),
            metrics_path: "/metrics".to_string(),
            https: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cert = env_opt("HTTPS_LISTEN_CERT").map(PathBuf::from);
        let key = env_opt("HTTPS_LISTEN_KEY").map(PathBuf::from);
        let client_ca = env_opt("HTTPS_LISTEN_CA").map(PathBuf::from);
        let verify_client = env_bool("HTTPS_LISTEN_VERIFY", false);

        let https = match (cert, key) {
            (Some(cert_path), Some(key_path)) => Some(HttpsConfig {
                cert_path,
                key_path,
                client_ca_path: client_ca,
                verify_client,
            }),
            (None, None) => {
                if client_ca.is_some() || verify_client {
                    return Err(ConfigError::invalid(
                        "HTTPS_LISTEN_CA",
                        "client verification requires HTTPS_LISTEN_CERT and HTTPS_LISTEN_KEY",
                    ));
                }
                None
            }
            _ => {
                return Err(ConfigError::invalid(
                    "HTTPS_LISTEN_CERT",
                    "must specify both HTTPS_LISTEN_CERT and HTTPS_LISTEN_KEY",
                ))
            }
        };

        let config = Self {
            listen_addr: env_or("HTTP_LISTEN_ADDR", "127.0.0.1:8080"),
            listen_path: env_or("HTTP_LISTEN_PATH", "/"),
            metrics_addr: env_or("METRICS_LISTEN_ADDR", "127.0.0.1:9000"),
            metrics_path: env_or("METRICS_PATH", "/metrics"),
            https,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.is_empty() {
            return Err(ConfigError::Missing {
                key: "HTTP_LISTEN_ADDR".to_string(),
            });
        }
        if self.metrics_addr.is_empty() {
            return Err(ConfigError::Missing {
                key: "METRICS_LISTEN_ADDR".to_string(),
            });
        }
        if !self.listen_path.starts_with('/') {
            return Err(ConfigError::invalid("HTTP_LISTEN_PATH", "must start with '/'"));
        }
        if !self.metrics_path.starts_with('/') {
            return Err(ConfigError::invalid("METRICS_PATH", "must start with '/'"));
        }
        if let Some(https) = &self.https {
            if https.verify_client && https.client_ca_path.is_none() {
                return Err(ConfigError::invalid(
                    "HTTPS_LISTEN_VERIFY",
                    "requires HTTPS_LISTEN_CA (a trust CA is needed for client certificate auth)",
                ));
            }
        }
        Ok(())
    }

    /// Check if the health listener serves HTTPS.
    pub fn is_https(&self) -> bool {
        self.https.is_some()
    }
}
