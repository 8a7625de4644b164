//! TCP listener implementation.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use tokio::net::{TcpListener as TokioTcpListener, TcpStream, ToSocketAddrs};

use super::{Connection, Listener, ListenerFuture};

/// A TCP connection.
pub struct TcpConnection {
    stream: TcpStream,
    remote_addr: SocketAddr,
}

impl TcpConnection {
    /// Create a new TCP connection.
    pub fn new(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            stream,
            remote_addr,
        }
    }
}

impl Connection for TcpConnection {
    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl tokio::io::AsyncRead for TcpConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for TcpConnection {
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

/// Accept a TCP connection and set TCP_NODELAY.
pub(super) async fn accept_tcp(listener: &TokioTcpListener) -> io::Result<(TcpStream, SocketAddr)> {
    let (stream, addr) = listener.accept().await?;

    // Set TCP_NODELAY for lower latency
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
    }

    Ok((stream, addr))
}

/// A TCP listener that accepts plain TCP connections.
pub struct TcpListener {
    inner: TokioTcpListener,
}

impl TcpListener {
    /// Create a new TCP listener bound to the given address.
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let inner = TokioTcpListener::bind(addr).await?;
        Ok(Self { inner })
    }
}

impl Listener for TcpListener {
    type Conn = TcpConnection;

    fn accept(&self) -> ListenerFuture<'_, (TcpStream, SocketAddr)> {
        Box::pin(accept_tcp(&self.inner))
    }

    fn handshake(
        &self,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> ListenerFuture<'static, Self::Conn> {
        Box::pin(async move { Ok(TcpConnection::new(stream, remote_addr)) })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}
