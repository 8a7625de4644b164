//! Health endpoint request handling.

use std::borrow::Cow;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http_body_util::Full;
use hyper::body::Incoming as IncomingBody;
use hyper::{Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::logging::ACCESS_TARGET;
use crate::observability::MetricsRecorder;
use crate::output;
use crate::probe::Prober;

/// Query parameter naming the service to probe.
pub const SERVICE_NAME_PARAM: &str = "serviceName";

/// Translates HTTP requests on the health path into probes.
pub struct HealthService {
    prober: Prober,
    path: String,
    metrics: Arc<dyn MetricsRecorder>,
    shutdown: CancellationToken,
}

impl HealthService {
    pub fn new(
        prober: Prober,
        path: impl Into<String>,
        metrics: Arc<dyn MetricsRecorder>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            prober,
            path: path.into(),
            metrics,
            shutdown,
        }
    }

    /// Handle one request.
    pub async fn handle(
        &self,
        req: Request<IncomingBody>,
        remote_addr: SocketAddr,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let start = Instant::now();

        if req.uri().path() != self.path {
            return Ok(text_response(StatusCode::NOT_FOUND, "404 page not found\n"));
        }

        let service_name = resolve_service_name(
            self.prober.config().service_name.as_deref(),
            req.uri().query(),
        );

        // Cancelled on shutdown, or when hyper drops this future because the
        // client went away.
        let cancel = self.shutdown.child_token();
        let _guard = cancel.clone().drop_guard();

        let result = self.prober.check(&cancel, &service_name).await;
        let rendered = output::render(&service_name, &result);

        let elapsed = start.elapsed();
        self.metrics.observe_request(&self.path, elapsed);
        info!(
            target: ACCESS_TARGET,
            method = %req.method(),
            path = %req.uri(),
            status = rendered.status.as_u16() as u64,
            service = %service_name,
            ip = %remote_addr.ip(),
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "Health request"
        );

        Ok(text_response(rendered.status, rendered.body))
    }
}

/// Service name for a request.
///
/// A configured fixed name wins over the `serviceName` query parameter;
/// with neither, the empty name (overall server status) is probed.
pub fn resolve_service_name(fixed: Option<&str>, query: Option<&str>) -> String {
    if let Some(name) = fixed.filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    query
        .and_then(|q| query_param(q, SERVICE_NAME_PARAM))
        .unwrap_or_default()
}

/// First value of `name` in a query string.
fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.find('=') {
            Some(pos) => (&pair[..pos], &pair[pos + 1..]),
            None => (pair, ""),
        })
        .find(|(key, _)| form_decode(key) == name)
        .map(|(_, value)| form_decode(value).into_owned())
}

/// Decode a form-encoded component (`+` is a space).
fn form_decode(s: &str) -> Cow<'_, str> {
    if !s.contains(['%', '+']) {
        return Cow::Borrowed(s);
    }
    let s = s.replace('+', " ");
    Cow::Owned(
        percent_encoding::percent_decode_str(&s)
            .decode_utf8_lossy()
            .into_owned(),
    )
}

pub(super) fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(output::CONTENT_TYPE));
    response
}
