//! Probe target configuration.

use std::path::PathBuf;
use std::time::Duration;

use super::parse::{env_bool, env_duration, env_opt, env_or};
use super::ConfigError;

/// Default user-agent sent with health check RPCs.
pub const DEFAULT_USER_AGENT: &str = "grpc_health_proxy";

/// Transport security mode for the upstream gRPC connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Plaintext HTTP/2 (INSECURE transport).
    #[default]
    Plaintext,
    /// TLS with standard certificate chain verification.
    Verify,
    /// TLS without certificate verification (INSECURE).
    NoVerify,
}

impl TlsMode {
    /// Resolve the mode from the `GRPC_TLS` / `GRPC_TLS_NO_VERIFY` switches.
    pub fn from_flags(tls: bool, no_verify: bool) -> Result<Self, ConfigError> {
        match (tls, no_verify) {
            (false, false) => Ok(Self::Plaintext),
            (false, true) => Err(ConfigError::invalid(
                "GRPC_TLS_NO_VERIFY",
                "specified without GRPC_TLS",
            )),
            (true, false) => Ok(Self::Verify),
            (true, true) => Ok(Self::NoVerify),
        }
    }

    /// Check if TLS is enabled.
    pub fn is_tls(&self) -> bool {
        *self != Self::Plaintext
    }
}

impl std::fmt::Display for TlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plaintext => write!(f, "plaintext"),
            Self::Verify => write!(f, "tls"),
            Self::NoVerify => write!(f, "tls-no-verify"),
        }
    }
}

/// TLS settings for the upstream gRPC connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeTlsConfig {
    pub mode: TlsMode,
    /// Trusted CA bundle (PEM) for verifying the server.
    pub ca_cert: Option<PathBuf>,
    /// Client certificate chain (PEM) for mutual TLS.
    pub client_cert: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS.
    pub client_key: Option<PathBuf>,
    /// Override for the name used in SNI and certificate verification.
    pub sni_server_name: Option<String>,
}

impl ProbeTlsConfig {
    /// Plaintext transport.
    pub fn plaintext() -> Self {
        Self::default()
    }

    /// TLS with chain verification against `ca_cert` (or platform roots).
    pub fn verify(ca_cert: Option<impl Into<PathBuf>>) -> Self {
        Self {
            mode: TlsMode::Verify,
            ca_cert: ca_cert.map(Into::into),
            ..Default::default()
        }
    }

    /// TLS without chain verification.
    pub fn no_verify() -> Self {
        Self {
            mode: TlsMode::NoVerify,
            ..Default::default()
        }
    }

    pub fn with_client_identity(
        mut self,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    pub fn with_sni_server_name(mut self, name: impl Into<String>) -> Self {
        self.sni_server_name = Some(name.into());
        self
    }

    /// Load from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = TlsMode::from_flags(
            env_bool("GRPC_TLS", false),
            env_bool("GRPC_TLS_NO_VERIFY", false),
        )?;

        Ok(Self {
            mode,
            ca_cert: env_opt("GRPC_TLS_CA_CERT").map(PathBuf::from),
            client_cert: env_opt("GRPC_TLS_CLIENT_CERT").map(PathBuf::from),
            client_key: env_opt("GRPC_TLS_CLIENT_KEY").map(PathBuf::from),
            sni_server_name: env_opt("GRPC_TLS_SNI_SERVER_NAME"),
        })
    }

    /// Validate option combinations.
    ///
    /// Pure check on the declared settings; no files are touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mode.is_tls() {
            let stray = [
                ("GRPC_TLS_CA_CERT", self.ca_cert.is_some()),
                ("GRPC_TLS_CLIENT_CERT", self.client_cert.is_some()),
                ("GRPC_TLS_CLIENT_KEY", self.client_key.is_some()),
                ("GRPC_TLS_SNI_SERVER_NAME", self.sni_server_name.is_some()),
            ];
            if let Some((key, _)) = stray.iter().find(|(_, set)| *set) {
                return Err(ConfigError::invalid(key, "specified without GRPC_TLS"));
            }
            return Ok(());
        }

        match (&self.client_cert, &self.client_key) {
            (Some(_), None) => {
                return Err(ConfigError::invalid(
                    "GRPC_TLS_CLIENT_CERT",
                    "specified without GRPC_TLS_CLIENT_KEY",
                ))
            }
            (None, Some(_)) => {
                return Err(ConfigError::invalid(
                    "GRPC_TLS_CLIENT_KEY",
                    "specified without GRPC_TLS_CLIENT_CERT",
                ))
            }
            _ => {}
        }

        if self.mode == TlsMode::NoVerify {
            if self.ca_cert.is_some() {
                return Err(ConfigError::invalid(
                    "GRPC_TLS_CA_CERT",
                    "cannot be combined with GRPC_TLS_NO_VERIFY (CA cert would not be used)",
                ));
            }
            if self.sni_server_name.is_some() {
                return Err(ConfigError::invalid(
                    "GRPC_TLS_SNI_SERVER_NAME",
                    "cannot be combined with GRPC_TLS_NO_VERIFY (server name would not be used)",
                ));
            }
        }

        Ok(())
    }
}

/// Immutable description of the probe target.
///
/// Built once at startup and shared read-only between concurrent probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Target `host:port`.
    pub addr: String,
    /// Fixed service name; when set, per-request names are ignored.
    pub service_name: Option<String>,
    /// User-agent header value of health check requests.
    pub user_agent: String,
    /// Budget for establishing the connection.
    pub connect_timeout: Duration,
    /// Budget for the Check RPC, measured from the end of the connect phase.
    pub rpc_timeout: Duration,
    /// Upstream transport security.
    pub tls: ProbeTlsConfig,
}

impl ProbeConfig {
    /// Create a plaintext configuration with default timeouts (1s / 1s).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            service_name: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(1),
            rpc_timeout: Duration::from_secs(1),
            tls: ProbeTlsConfig::plaintext(),
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, rpc: Duration) -> Self {
        self.connect_timeout = connect;
        self.rpc_timeout = rpc;
        self
    }

    pub fn with_tls(mut self, tls: ProbeTlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env_opt("GRPC_ADDR").ok_or_else(|| ConfigError::Missing {
            key: "GRPC_ADDR".to_string(),
        })?;

        let config = Self {
            addr,
            service_name: env_opt("SERVICE_NAME"),
            user_agent: env_or("USER_AGENT", DEFAULT_USER_AGENT),
            connect_timeout: env_duration("CONNECT_TIMEOUT", "1s")?,
            rpc_timeout: env_duration("RPC_TIMEOUT", "1s")?,
            tls: ProbeTlsConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.is_empty() {
            return Err(ConfigError::Missing {
                key: "GRPC_ADDR".to_string(),
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "CONNECT_TIMEOUT",
                "must be greater than zero",
            ));
        }
        if self.rpc_timeout.is_zero() {
            return Err(ConfigError::invalid("RPC_TIMEOUT", "must be greater than zero"));
        }
        if self.user_agent.is_empty() {
            return Err(ConfigError::invalid("USER_AGENT", "cannot be empty"));
        }
        if http::HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(ConfigError::invalid(
                "USER_AGENT",
                "contains characters not allowed in a header value",
            ));
        }
        self.tls.validate()
    }
}
