//! TLS listener implementation using rustls.

use std::fs::File;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::CertificateDer;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig as RustlsConfig};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream, ToSocketAddrs};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use super::tcp::accept_tcp;
use super::{Connection, Listener, ListenerFuture, TlsInfo};
use crate::config::HttpsConfig;

/// Upper bound for a client to complete the TLS handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A TLS connection.
pub struct TlsConnection {
    stream: TlsStream<TcpStream>,
    remote_addr: SocketAddr,
    tls_info: TlsInfo,
}

impl TlsConnection {
    /// Create a new TLS connection.
    pub fn new(stream: TlsStream<TcpStream>, remote_addr: SocketAddr, tls_info: TlsInfo) -> Self {
        Self {
            stream,
            remote_addr,
            tls_info,
        }
    }
}

impl Connection for TlsConnection {
    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn tls_info(&self) -> Option<&TlsInfo> {
        Some(&self.tls_info)
    }
}

impl tokio::io::AsyncRead for TlsConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for TlsConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// A TLS listener that accepts encrypted connections.
pub struct TlsListener {
    tcp_listener: TokioTcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    /// Create a new TLS listener bound to the given address.
    ///
    /// Key material is loaded before binding, so a bad certificate never
    /// leaves a half-configured socket behind.
    pub async fn bind(addr: impl ToSocketAddrs, config: &HttpsConfig) -> io::Result<Self> {
        let tls_config = Self::load_tls_config(config)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let tcp_listener = TokioTcpListener::bind(addr).await?;

        Ok(Self {
            tcp_listener,
            acceptor,
        })
    }

    /// Load TLS configuration from cert, key, and optional client CA files.
    fn load_tls_config(config: &HttpsConfig) -> Result<RustlsConfig, BoxError> {
        let certs = load_certs(&config.cert_path)?;
        if certs.is_empty() {
            return Err(format!(
                "no certificates found in {}",
                config.cert_path.display()
            )
            .into());
        }

        let key_file = File::open(&config.key_path)
            .map_err(|e| format!("failed to open {}: {}", config.key_path.display(), e))?;
        let mut key_reader = BufReader::new(key_file);
        let key = rustls_pemfile::private_key(&mut key_reader)?
            .ok_or_else(|| format!("no private key found in {}", config.key_path.display()))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = RustlsConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?;

        let builder = match &config.client_ca_path {
            Some(ca_path) => {
                let mut roots = RootCertStore::empty();
                let (added, _) = roots.add_parsable_certificates(load_certs(ca_path)?);
                if added == 0 {
                    return Err(
                        format!("no certificates found in {}", ca_path.display()).into()
                    );
                }

                let verifier =
                    WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
                let verifier = if config.verify_client {
                    verifier.build()?
                } else {
                    // Verify certificates when presented, accept clients without one
                    verifier.allow_unauthenticated().build()?
                };
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        let mut tls_config = builder.with_single_cert(certs, key)?;

        // Enable ALPN for HTTP/2 and HTTP/1.1
        tls_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(tls_config)
    }

    /// Get TLS protocol version string.
    fn protocol_version(conn: &TlsStream<TcpStream>) -> String {
        let (_, server_conn) = conn.get_ref();
        match server_conn.protocol_version() {
            Some(rustls::ProtocolVersion::TLSv1_2) => "TLSv1.2".to_string(),
            Some(rustls::ProtocolVersion::TLSv1_3) => "TLSv1.3".to_string(),
            _ => "unknown".to_string(),
        }
    }

    /// Get ALPN negotiated protocol.
    fn alpn_protocol(conn: &TlsStream<TcpStream>) -> Option<String> {
        let (_, server_conn) = conn.get_ref();
        server_conn
            .alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).to_string())
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, BoxError> {
    let file =
        File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let mut reader = BufReader::new(file);
    Ok(rustls_pemfile::certs(&mut reader)
        .filter_map(|r| r.ok())
        .collect())
}

impl Listener for TlsListener {
    type Conn = TlsConnection;

    fn accept(&self) -> ListenerFuture<'_, (TcpStream, SocketAddr)> {
        Box::pin(accept_tcp(&self.tcp_listener))
    }

    fn handshake(
        &self,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> ListenerFuture<'static, Self::Conn> {
        let acceptor = self.acceptor.clone();
        Box::pin(async move {
            // Perform TLS handshake with timing
            let handshake_start = Instant::now();
            let tls_stream = tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tls handshake timed out"))?
                .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e))?;
            let handshake_duration = handshake_start.elapsed();

            let tls_info = TlsInfo {
                protocol: Self::protocol_version(&tls_stream),
                alpn: Self::alpn_protocol(&tls_stream),
                client_certificate: tls_stream.get_ref().1.peer_certificates().is_some(),
                handshake_duration,
            };

            Ok(TlsConnection::new(tls_stream, remote_addr, tls_info))
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp_listener.local_addr()
    }

    fn name(&self) -> &'static str {
        "tls"
    }

    fn is_tls(&self) -> bool {
        true
    }
}
