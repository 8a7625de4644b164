//! Listener abstractions for the health endpoint.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                Listener trait                │
//! ├──────────────────────────────────────────────┤
//! │  ┌─────────────┐          ┌─────────────┐    │
//! │  │ TcpListener │          │ TlsListener │    │
//! │  │   (tcp.rs)  │          │   (tls.rs)  │    │
//! │  └──────┬──────┘          └──────┬──────┘    │
//! │         │   accept()  (TCP only) │           │
//! │         │   handshake() (per task)           │
//! │         └────────────┬───────────┘           │
//! │              ┌───────▼───────┐               │
//! │              │   Connection  │               │
//! │              └───────────────┘               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Accepting and handshaking are split so a slow TLS client only stalls
//! its own connection task, never the accept loop.

mod tcp;
mod tls;

pub use tcp::{TcpConnection, TcpListener};
pub use tls::{TlsConnection, TlsListener};

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Boxed future returned by listener operations.
pub type ListenerFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// A connection accepted by a listener.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Get the remote address of the connection.
    fn remote_addr(&self) -> SocketAddr;

    /// Get TLS information if this is a TLS connection.
    fn tls_info(&self) -> Option<&TlsInfo> {
        None
    }
}

/// TLS connection information.
#[derive(Debug, Clone)]
pub struct TlsInfo {
    /// TLS protocol version (e.g., "TLSv1.3").
    pub protocol: String,
    /// ALPN negotiated protocol (e.g., "h2", "http/1.1").
    pub alpn: Option<String>,
    /// Whether the client presented a certificate.
    pub client_certificate: bool,
    /// TLS handshake duration.
    pub handshake_duration: Duration,
}

/// Trait for listening and accepting connections.
pub trait Listener: Send + Sync + 'static {
    /// The connection type produced by this listener.
    type Conn: Connection;

    /// Accept the next TCP connection.
    fn accept(&self) -> ListenerFuture<'_, (TcpStream, SocketAddr)>;

    /// Finish setting up an accepted connection (TLS handshake, if any).
    ///
    /// The returned future is independent of `self` so it can run in the
    /// connection task.
    fn handshake(&self, stream: TcpStream, remote_addr: SocketAddr)
        -> ListenerFuture<'static, Self::Conn>;

    /// Get the local address this listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Get the listener name for logging.
    fn name(&self) -> &'static str;

    /// Check if this listener uses TLS.
    fn is_tls(&self) -> bool {
        false
    }
}
