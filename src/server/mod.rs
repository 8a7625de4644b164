//! HTTP side of the proxy: health endpoint and metrics endpoint.
//!
//! ```text
//!  GET <listen_path>?serviceName=X ──► HealthService ──► Prober ──► render()
//!  GET <metrics_path>              ──► Metrics::export()
//! ```
//!
//! # Shutdown
//!
//! Cancelling [`Server::shutdown_token`] stops both accept loops, cancels
//! in-flight probes, asks open connections to close gracefully, and waits up
//! to [`DRAIN_TIMEOUT`] for them. A metrics listener failure triggers the
//! same shutdown and is returned from [`Server::run`].

mod error;
mod health;
mod internal;

pub use error::ServerError;
pub use health::{resolve_service_name, HealthService, SERVICE_NAME_PARAM};
pub use internal::run_metrics_server;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener as TokioTcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::listener::{Connection, Listener, TcpListener, TlsListener};
use crate::observability::{Metrics, MetricsRecorder};
use crate::probe::Prober;

/// Upper bound for open health connections to finish after shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

enum HealthListener {
    Tcp(TcpListener),
    Tls(TlsListener),
}

impl HealthListener {
    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            HealthListener::Tcp(l) => l.local_addr(),
            HealthListener::Tls(l) => l.local_addr(),
        }
    }
}

/// Bound health and metrics listeners, ready to run.
pub struct Server {
    health: HealthListener,
    metrics_listener: TokioTcpListener,
    service: Arc<HealthService>,
    metrics: Arc<Metrics>,
    metrics_path: Arc<str>,
    shutdown: CancellationToken,
}

impl Server {
    /// Bind both listeners.
    pub async fn bind(
        config: &ServerConfig,
        prober: Prober,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ServerError> {
        let health = match &config.https {
            Some(https) => TlsListener::bind(config.listen_addr.as_str(), https)
                .await
                .map(HealthListener::Tls),
            None => TcpListener::bind(config.listen_addr.as_str())
                .await
                .map(HealthListener::Tcp),
        }
        .map_err(|error| ServerError::Bind {
            listener: "health",
            addr: config.listen_addr.clone(),
            error,
        })?;

        let metrics_listener = TokioTcpListener::bind(config.metrics_addr.as_str())
            .await
            .map_err(|error| ServerError::Bind {
                listener: "metrics",
                addr: config.metrics_addr.clone(),
                error,
            })?;

        let shutdown = CancellationToken::new();
        let recorder: Arc<dyn MetricsRecorder> = metrics.clone();
        let service = Arc::new(HealthService::new(
            prober,
            config.listen_path.clone(),
            recorder,
            shutdown.clone(),
        ));

        Ok(Self {
            health,
            metrics_listener,
            service,
            metrics,
            metrics_path: Arc::from(config.metrics_path.as_str()),
            shutdown,
        })
    }

    /// Address of the health listener.
    pub fn health_addr(&self) -> std::io::Result<SocketAddr> {
        self.health.local_addr()
    }

    /// Address of the metrics listener.
    pub fn metrics_addr(&self) -> std::io::Result<SocketAddr> {
        self.metrics_listener.local_addr()
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until shutdown or a fatal metrics listener error.
    pub async fn run(self) -> Result<(), ServerError> {
        let tracker = TaskTracker::new();
        let shutdown = self.shutdown;

        let health_loop = match self.health {
            HealthListener::Tcp(l) => tokio::spawn(accept_loop(
                l,
                Arc::clone(&self.service),
                tracker.clone(),
                shutdown.clone(),
            )),
            HealthListener::Tls(l) => tokio::spawn(accept_loop(
                l,
                Arc::clone(&self.service),
                tracker.clone(),
                shutdown.clone(),
            )),
        };

        if let Ok(addr) = self.metrics_listener.local_addr() {
            info!("Metrics server listening on http://{}{}", addr, self.metrics_path);
        }
        let result = run_metrics_server(
            self.metrics_listener,
            self.metrics,
            self.metrics_path,
            shutdown.clone(),
        )
        .await;

        if let Err(ref e) = result {
            error!(error = %e, "Metrics server failed, shutting down");
        }

        // Stop the health side too if the metrics server failed first
        shutdown.cancel();
        let _ = health_loop.await;

        tracker.close();
        if tokio::time::timeout(DRAIN_TIMEOUT, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                connections = tracker.len(),
                "Drain timeout reached with open connections"
            );
        }

        result
    }
}

/// Accept health connections until shutdown.
async fn accept_loop<L: Listener>(
    listener: L,
    service: Arc<HealthService>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
) {
    if let Ok(addr) = listener.local_addr() {
        let scheme = if listener.is_tls() { "https" } else { "http" };
        info!(listener = listener.name(), "Health server listening on {}://{}", scheme, addr);
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, remote_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "Health listener accept error");
                        continue;
                    }
                };

                let handshake = listener.handshake(stream, remote_addr);
                let service = Arc::clone(&service);
                let shutdown = shutdown.clone();

                tracker.spawn(async move {
                    match handshake.await {
                        Ok(conn) => serve_connection(conn, service, shutdown).await,
                        Err(e) => debug!(remote = %remote_addr, error = %e, "Handshake failed"),
                    }
                });
            }
            _ = shutdown.cancelled() => {
                debug!("Health server received shutdown signal, stopping accept loop");
                break;
            }
        }
    }
}

/// Serve HTTP/1.1 or HTTP/2 on one connection.
async fn serve_connection<C: Connection>(
    conn: C,
    service: Arc<HealthService>,
    shutdown: CancellationToken,
) {
    let remote_addr = conn.remote_addr();
    if let Some(tls) = conn.tls_info() {
        debug!(
            remote = %remote_addr,
            protocol = %tls.protocol,
            alpn = tls.alpn.as_deref().unwrap_or(""),
            client_certificate = tls.client_certificate,
            handshake_ms = tls.handshake_duration.as_secs_f64() * 1000.0,
            "TLS connection established"
        );
    }

    let svc = service_fn(move |req| {
        let service = Arc::clone(&service);
        async move { service.handle(req, remote_addr).await }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(conn), svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        debug!(remote = %remote_addr, error = %e, "Connection error");
    }
}
