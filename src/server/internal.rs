//! Internal HTTP server for the metrics endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http_body_util::Full;
use hyper::body::Incoming as IncomingBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::health::text_response;
use super::ServerError;
use crate::observability::Metrics;

/// Serve Prometheus metrics on `path` until `shutdown` fires.
///
/// An accept failure ends the server with an error.
pub async fn run_metrics_server(
    listener: TcpListener,
    metrics: Arc<Metrics>,
    path: Arc<str>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    loop {
        let (stream, _) = tokio::select! {
            result = listener.accept() => result.map_err(|error| ServerError::Accept {
                listener: "metrics",
                error,
            })?,
            _ = shutdown.cancelled() => return Ok(()),
        };
        let _ = stream.set_nodelay(true);
        let metrics = Arc::clone(&metrics);
        let path = Arc::clone(&path);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let m = Arc::clone(&metrics);
                let p = Arc::clone(&path);
                async move { handle_internal_request(req, m, p).await }
            });

            let io = TokioIo::new(stream);
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(error = %e, "Metrics connection error");
            }
        });
    }
}

/// Handle internal server requests (metrics path only).
async fn handle_internal_request(
    req: Request<IncomingBody>,
    metrics: Arc<Metrics>,
    path: Arc<str>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.uri().path() != &*path {
        return Ok(text_response(StatusCode::NOT_FOUND, "404 page not found\n"));
    }

    let mut response = Response::new(Full::new(Bytes::from(metrics.export())));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static(metrics.content_type()),
    );
    Ok(response)
}
