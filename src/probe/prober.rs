//! One-shot gRPC health probe.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;
use tracing::{debug, info, warn};

use super::classify::classify;
use super::connector::ProbeConnector;
use super::credentials::Credentials;
use super::error::{error_chain, ConnectError, ProbeResult, RawProbeError};
use super::ServingStatus;
use crate::config::ProbeConfig;
use crate::observability::{MetricsRecorder, ProbePhase};

/// Timer rounding allowed between the peer's deadline and ours.
const DEADLINE_SLACK: Duration = Duration::from_millis(10);

/// Runs health probes against the configured target.
///
/// Holds only read-only state; one instance is shared by all concurrent
/// probes. Every probe opens its own connection and drops it afterwards.
#[derive(Clone)]
pub struct Prober {
    config: Arc<ProbeConfig>,
    credentials: Arc<Credentials>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl Prober {
    pub fn new(
        config: Arc<ProbeConfig>,
        credentials: Arc<Credentials>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            config,
            credentials,
            metrics,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe `service_name` and classify any failure.
    ///
    /// Records the result label and total duration, and logs the outcome.
    pub async fn check(&self, cancel: &CancellationToken, service_name: &str) -> ProbeResult {
        let start = Instant::now();
        let result = self
            .probe(cancel, service_name)
            .await
            .map_err(|raw| classify(service_name, raw));
        let elapsed = start.elapsed();

        match &result {
            Ok(status) => {
                self.metrics
                    .record_result(service_name, status.as_str(), elapsed);
                let elapsed_ms = elapsed.as_millis() as u64;
                if status.is_serving() {
                    debug!(service = service_name, %status, elapsed_ms, "Health probe completed");
                } else {
                    info!(service = service_name, %status, elapsed_ms, "Health probe completed");
                }
            }
            Err(e) => {
                self.metrics
                    .record_result(service_name, e.result_label(), elapsed);
                warn!(
                    service = service_name,
                    kind = e.kind(),
                    error = %error_chain(e.raw()),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Health probe failed"
                );
            }
        }

        result
    }

    /// Run one connect attempt and one `Check` call.
    ///
    /// The connect phase is bounded by `connect_timeout`; the call phase by
    /// `rpc_timeout`, counted from the moment the connection is ready.
    /// Cancelling `cancel` aborts whichever phase is running.
    pub async fn probe(
        &self,
        cancel: &CancellationToken,
        service_name: &str,
    ) -> Result<ServingStatus, RawProbeError> {
        let connect_timeout = self.config.connect_timeout;
        let start = Instant::now();
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConnectError::Cancelled),
            result = tokio::time::timeout(connect_timeout, self.connect()) => {
                result.unwrap_or(Err(ConnectError::Timeout(connect_timeout)))
            }
        };
        self.metrics
            .observe_phase(service_name, ProbePhase::Connect, start.elapsed());

        let channel = connected.map_err(|error| RawProbeError::Connect {
            addr: self.config.addr.clone(),
            error,
        })?;

        let start = Instant::now();
        let result = self.call(cancel, channel, service_name).await;
        self.metrics
            .observe_phase(service_name, ProbePhase::Call, start.elapsed());

        result.map_err(RawProbeError::Call)
    }

    /// Establish the HTTP/2 connection.
    async fn connect(&self) -> Result<Channel, ConnectError> {
        let addr = &self.config.addr;
        let endpoint = Endpoint::from_shared(format!("http://{}", addr))
            .map_err(|e| ConnectError::InvalidAddress {
                addr: addr.clone(),
                error: error_chain(&e),
            })?
            .user_agent(self.config.user_agent.clone())
            .map_err(ConnectError::Transport)?;

        endpoint
            .connect_with_connector(ProbeConnector::new(Credentials::clone(&self.credentials)))
            .await
            .map_err(ConnectError::Transport)
    }

    /// Issue the `Check` call on an established channel.
    async fn call(
        &self,
        cancel: &CancellationToken,
        channel: Channel,
        service_name: &str,
    ) -> Result<ServingStatus, Status> {
        let rpc_timeout = self.config.rpc_timeout;
        let mut client = HealthClient::new(channel);

        let mut request = tonic::Request::new(HealthCheckRequest {
            service: service_name.to_string(),
        });
        // Propagated to the peer as grpc-timeout
        request.set_timeout(rpc_timeout);

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Status::cancelled("probe cancelled")),
            result = tokio::time::timeout(rpc_timeout, client.check(request)) => match result {
                Ok(response) => {
                    response.map(|r| ServingStatus::from_wire(r.into_inner().status))
                }
                Err(_) => Err(Status::deadline_exceeded(format!(
                    "no response within {:?}",
                    rpc_timeout
                ))),
            },
        };

        result.map_err(|status| deadline_status(status, start.elapsed(), rpc_timeout))
    }
}

/// Report an expired `grpc-timeout` as a deadline expiry.
///
/// tonic enforces the header it sends (in the channel, and again on tonic
/// peers) and reports expiry as `Cancelled: Timeout expired`, which can win
/// the race against the local timer. Only statuses received once
/// the call budget (less [`DEADLINE_SLACK`]) has elapsed are rewritten.
fn deadline_status(status: Status, elapsed: Duration, rpc_timeout: Duration) -> Status {
    if status.code() == Code::Cancelled && elapsed + DEADLINE_SLACK >= rpc_timeout {
        Status::deadline_exceeded(format!(
            "no response within {:?} (peer: {})",
            rpc_timeout,
            status.message()
        ))
    } else {
        status
    }
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("addr", &self.config.addr)
            .field("credentials", &self.credentials)
            .finish()
    }
}
