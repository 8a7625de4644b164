//! Test helpers and utilities

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use reqwest::{Client, Response, StatusCode};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::transport::Identity;

use grpc_health_proxy::config::{ProbeConfig, ServerConfig};
use grpc_health_proxy::example::{self, ExampleHealthService};
use grpc_health_proxy::observability::{Metrics, MetricsRecorder, NoopRecorder};
use grpc_health_proxy::probe::{CredentialBuilder, Prober};
use grpc_health_proxy::Server;

/// Service monitored by the example server in tests.
pub const ECHO: &str = "echo.EchoServer";

/// In-process example health server, stopped on drop.
pub struct ExampleServer {
    pub addr: SocketAddr,
    _guard: DropGuard,
}

impl ExampleServer {
    pub async fn start(service: ExampleHealthService) -> Self {
        Self::start_with_identity(service, None).await
    }

    pub async fn start_with_identity(
        service: ExampleHealthService,
        identity: Option<Identity>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind example server");
        let addr = listener.local_addr().unwrap();

        let token = CancellationToken::new();
        let shutdown = token.clone();
        tokio::spawn(async move {
            example::serve(service, listener, identity, async move {
                shutdown.cancelled().await
            })
            .await
            .expect("Example server failed");
        });

        Self {
            addr,
            _guard: token.drop_guard(),
        }
    }

    /// Plaintext probe configuration pointing at this server.
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig::new(self.addr.to_string())
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2))
    }
}

/// Prober without metrics.
pub fn prober(config: ProbeConfig) -> Prober {
    let credentials = CredentialBuilder::build(&config.tls).expect("Failed to build credentials");
    Prober::new(
        Arc::new(config),
        Arc::new(credentials),
        Arc::new(NoopRecorder),
    )
}

/// Address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Upstream that accepts TCP, swallows whatever arrives and never answers.
///
/// Signals when a connection is accepted and when the peer closes it.
pub struct SilentUpstream {
    pub addr: SocketAddr,
    accepted: Arc<Notify>,
    closed: Arc<Notify>,
    _guard: DropGuard,
}

impl SilentUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind silent upstream");
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(Notify::new());
        let closed = Arc::new(Notify::new());

        let token = CancellationToken::new();
        let shutdown = token.clone();
        let (on_accept, on_close) = (Arc::clone(&accepted), Arc::clone(&closed));
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = tokio::select! {
                    result = listener.accept() => match result {
                        Ok(conn) => conn,
                        Err(_) => return,
                    },
                    _ = shutdown.cancelled() => return,
                };
                on_accept.notify_one();

                let on_close = Arc::clone(&on_close);
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    while let Ok(n) = stream.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                    }
                    on_close.notify_one();
                });
            }
        });

        Self {
            addr,
            accepted,
            closed,
            _guard: token.drop_guard(),
        }
    }

    /// Resolves once a connection has been accepted.
    pub async fn accepted(&self) {
        self.accepted.notified().await
    }

    /// Resolves once an accepted connection has been closed by the peer.
    pub async fn closed(&self) {
        self.closed.notified().await
    }
}

/// Running proxy server with an HTTP client.
pub struct ProxyServer {
    pub health_url: String,
    pub metrics_url: String,
    pub client: Client,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[allow(dead_code)]
impl ProxyServer {
    /// Start the proxy on ephemeral ports with `/healthz` and `/metrics`.
    pub async fn start(probe: ProbeConfig) -> Self {
        Self::start_with(probe, "/healthz").await
    }

    pub async fn start_with(probe: ProbeConfig, listen_path: &str) -> Self {
        let config = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            listen_path: listen_path.to_string(),
            metrics_addr: "127.0.0.1:0".to_string(),
            metrics_path: "/metrics".to_string(),
            https: None,
        };

        let metrics = Arc::new(Metrics::new().expect("Failed to create metrics"));
        let recorder: Arc<dyn MetricsRecorder> = metrics.clone();
        let credentials =
            CredentialBuilder::build(&probe.tls).expect("Failed to build credentials");
        let prober = Prober::new(Arc::new(probe), Arc::new(credentials), recorder);

        let server = Server::bind(&config, prober, metrics)
            .await
            .expect("Failed to bind proxy");
        let health_url = format!("http://{}{}", server.health_addr().unwrap(), listen_path);
        let metrics_url = format!("http://{}/metrics", server.metrics_addr().unwrap());
        let shutdown = server.shutdown_token();

        let handle = tokio::spawn(async move {
            server.run().await.expect("Proxy server failed");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            health_url,
            metrics_url,
            client,
            shutdown,
            handle: Some(handle),
        }
    }

    /// GET the health path with an optional query string.
    pub async fn health(&self, query: &str) -> Response {
        let url = if query.is_empty() {
            self.health_url.clone()
        } else {
            format!("{}?{}", self.health_url, query)
        };
        self.client.get(url).send().await.expect("GET request failed")
    }

    /// GET an arbitrary URL.
    pub async fn get(&self, url: &str) -> Response {
        self.client.get(url).send().await.expect("GET request failed")
    }

    /// Cancel the server and wait for it to stop.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(15), handle)
                .await
                .expect("Proxy did not stop")
                .expect("Proxy task panicked");
        }
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Assert status code and return the body.
pub async fn status_and_body(resp: Response, expected: StatusCode) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap();
    assert_eq!(status, expected, "Unexpected status, body: {}", body);
    body
}

/// Throwaway CA with one server certificate, written to a temp directory.
pub struct TestPki {
    dir: TempDir,
    pub ca_path: PathBuf,
    pub server_cert_pem: String,
    pub server_key_pem: String,
}

impl TestPki {
    /// Server certificate valid for `names`.
    pub fn new(names: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "health test CA");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = params.self_signed(&ca_key).unwrap();

        let key = KeyPair::generate().unwrap();
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let mut params = CertificateParams::new(names).unwrap();
        params.distinguished_name.push(DnType::CommonName, "health test server");
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let cert = params.signed_by(&key, &ca_cert, &ca_key).unwrap();

        let ca_path = dir.path().join("ca.pem");
        std::fs::write(&ca_path, ca_cert.pem()).unwrap();

        Self {
            dir,
            ca_path,
            server_cert_pem: cert.pem(),
            server_key_pem: key.serialize_pem(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::from_pem(&self.server_cert_pem, &self.server_key_pem)
    }

    /// Write `contents` next to the CA bundle.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}
