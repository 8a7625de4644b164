//! Example gRPC health server.
//!
//! A small `grpc.health.v1.Health` implementation for exercising the proxy.
//! The monitored service flips between SERVING and NOT_SERVING at random on
//! every check, driven by a configurable unhealthy probability.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus as PbServingStatus;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};
use tracing::debug;

use crate::config::parse::{env_bool, env_opt, env_or, env_parse};
use crate::config::ConfigError;
use crate::probe::ServingStatus;

/// Service whose status is re-rolled on every check.
pub const DEFAULT_MONITORED_SERVICE: &str = "echo.EchoServer";

/// How the example server answers `Check`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    /// Implement the health protocol.
    #[default]
    Health,
    /// Answer every call with `Unimplemented`, like a server without the
    /// health service registered.
    Unimplemented,
}

/// Reference implementation of the health service.
pub struct ExampleHealthService {
    statuses: Mutex<HashMap<String, ServingStatus>>,
    monitored: String,
    /// Percent chance (0-100) that a check marks the monitored service NOT_SERVING.
    unhealthy_probability: u32,
    behavior: Behavior,
    delay: Option<Duration>,
}

impl ExampleHealthService {
    pub fn new(unhealthy_probability: u32) -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            monitored: DEFAULT_MONITORED_SERVICE.to_string(),
            unhealthy_probability: unhealthy_probability.min(100),
            behavior: Behavior::Health,
            delay: None,
        }
    }

    pub fn with_monitored_service(mut self, name: impl Into<String>) -> Self {
        self.monitored = name.into();
        self
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Sleep before answering each check.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Register a service with a fixed status.
    pub fn set_status(&self, name: impl Into<String>, status: ServingStatus) {
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), status);
    }

    pub fn into_server(self) -> HealthServer<Self> {
        HealthServer::new(self)
    }

    fn roll(&self) -> ServingStatus {
        let roll = rand::thread_rng().gen_range(0..100);
        if roll < self.unhealthy_probability {
            ServingStatus::NotServing
        } else {
            ServingStatus::Serving
        }
    }

    fn status_of(&self, service: &str) -> Option<ServingStatus> {
        let rolled = self.roll();
        let mut statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        statuses.insert(self.monitored.clone(), rolled);
        statuses.get(service).copied()
    }
}

#[tonic::async_trait]
impl Health for ExampleHealthService {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.behavior == Behavior::Unimplemented {
            return Err(Status::unimplemented(
                "unknown service grpc.health.v1.Health",
            ));
        }

        let service = request.into_inner().service;
        // Empty name asks for the server as a whole
        let status = if service.is_empty() {
            ServingStatus::Serving
        } else {
            self.status_of(&service)
                .ok_or_else(|| Status::not_found("unknown service"))?
        };

        debug!(service = %service, status = %status, "Check");
        Ok(Response::new(HealthCheckResponse {
            status: PbServingStatus::from(status) as i32,
        }))
    }

    type WatchStream = tokio_stream::Empty<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        Err(Status::unimplemented("watch is not supported"))
    }
}

/// Example server settings.
#[derive(Debug, Clone)]
pub struct ExampleConfig {
    pub listen_addr: String,
    pub unhealthy_probability: u32,
    pub monitored_service: String,
    pub behavior: Behavior,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl ExampleConfig {
    /// Load from `EXAMPLE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let unhealthy_probability: u32 = env_parse("EXAMPLE_UNHEALTHY_PROBABILITY", 0)?;
        if unhealthy_probability > 100 {
            return Err(ConfigError::invalid(
                "EXAMPLE_UNHEALTHY_PROBABILITY",
                "must be between 0 and 100",
            ));
        }

        let config = Self {
            listen_addr: env_or("EXAMPLE_LISTEN_ADDR", "127.0.0.1:50051"),
            unhealthy_probability,
            monitored_service: env_or("EXAMPLE_SERVICE_NAME", DEFAULT_MONITORED_SERVICE),
            behavior: if env_bool("EXAMPLE_UNIMPLEMENTED", false) {
                Behavior::Unimplemented
            } else {
                Behavior::Health
            },
            tls_cert: env_opt("EXAMPLE_TLS_CERT").map(PathBuf::from),
            tls_key: env_opt("EXAMPLE_TLS_KEY").map(PathBuf::from),
        };

        match (&config.tls_cert, &config.tls_key) {
            (Some(_), None) => Err(ConfigError::invalid(
                "EXAMPLE_TLS_CERT",
                "specified without EXAMPLE_TLS_KEY",
            )),
            (None, Some(_)) => Err(ConfigError::invalid(
                "EXAMPLE_TLS_KEY",
                "specified without EXAMPLE_TLS_CERT",
            )),
            _ => Ok(config),
        }
    }

    pub fn service(&self) -> ExampleHealthService {
        ExampleHealthService::new(self.unhealthy_probability)
            .with_monitored_service(self.monitored_service.clone())
            .with_behavior(self.behavior)
    }
}

/// Serve `service` on `listener` until `shutdown` completes.
pub async fn serve(
    service: ExampleHealthService,
    listener: TcpListener,
    identity: Option<Identity>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), tonic::transport::Error> {
    let mut builder = Server::builder();
    if let Some(identity) = identity {
        builder = builder.tls_config(ServerTlsConfig::new().identity(identity))?;
    }

    builder
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}
