//! Transport connector handed to tonic.
//!
//! tonic drives the HTTP/2 handshake; this connector only produces the byte
//! stream underneath it: TCP, optionally wrapped in a rustls session built
//! from the probe [`Credentials`].

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::Uri;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tower::Service;

use super::credentials::Credentials;

/// Byte stream to the probe target.
pub enum ProbeStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for ProbeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ProbeStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ProbeStream::Tls(s) => Pin::new(&mut **s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ProbeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ProbeStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ProbeStream::Tls(s) => Pin::new(&mut **s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ProbeStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ProbeStream::Tls(s) => Pin::new(&mut **s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ProbeStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ProbeStream::Tls(s) => Pin::new(&mut **s).poll_shutdown(cx),
        }
    }
}

/// `tower::Service<Uri>` establishing [`ProbeStream`]s.
#[derive(Clone, Debug)]
pub struct ProbeConnector {
    credentials: Credentials,
}

impl ProbeConnector {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    async fn connect(credentials: Credentials, uri: Uri) -> io::Result<ProbeStream> {
        let host = uri
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing host"))?;
        let port = uri
            .port_u16()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing port"))?;

        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;

        let tls = match credentials {
            Credentials::Plaintext => return Ok(ProbeStream::Plain(tcp)),
            Credentials::Tls(tls) => tls,
        };

        let name = tls.server_name(host);
        let server_name = ServerName::try_from(name.to_string()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid tls server name '{}': {}", name, e),
            )
        })?;

        let stream = TlsConnector::from(tls.config.clone())
            .connect(server_name, tcp)
            .await?;

        Ok(ProbeStream::Tls(Box::new(stream)))
    }
}

impl Service<Uri> for ProbeConnector {
    type Response = TokioIo<ProbeStream>;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let credentials = self.credentials.clone();
        Box::pin(async move { Self::connect(credentials, uri).await.map(TokioIo::new) })
    }
}
