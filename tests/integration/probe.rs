//! One-shot probe tests: the CLI path from probe to exit code.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use grpc_health_proxy::config::{ProbeConfig, ProbeTlsConfig};
use grpc_health_proxy::example::{Behavior, ExampleHealthService};
use grpc_health_proxy::output::{
    exit_code, render, EXIT_CONNECTION_FAILURE, EXIT_RPC_FAILURE, EXIT_SERVICE_NOT_FOUND,
    EXIT_SERVING, EXIT_UNHEALTHY, EXIT_UNIMPLEMENTED,
};
use grpc_health_proxy::probe::{CredentialBuilder, CredentialError, ProbeError, ServingStatus};

use crate::helpers::*;

/// Unreachable address: ConnectionFailure, exit 1, HTTP 502
#[tokio::test]
async fn test_unreachable_address() {
    let addr = closed_addr().await;
    let config = ProbeConfig::new(addr.to_string())
        .with_timeouts(Duration::from_secs(1), Duration::from_secs(5));
    let prober = prober(config);

    let result = prober.check(&CancellationToken::new(), ECHO).await;

    let err = result.as_ref().unwrap_err();
    assert!(matches!(err, ProbeError::ConnectionFailure(_)), "{err}");
    assert_eq!(err.service_name(), ECHO);
    assert_eq!(exit_code(&result), EXIT_CONNECTION_FAILURE);

    let response = render(ECHO, &result);
    assert_eq!(response.status.as_u16(), 502);
    assert!(response.body.starts_with("echo.EchoServer ConnectionFailure: "));
}

/// Healthy service: exit 0 with `<service> SERVING`
#[tokio::test]
async fn test_serving() {
    let server = ExampleServer::start(ExampleHealthService::new(0)).await;
    let prober = prober(server.probe_config());

    let result = prober.check(&CancellationToken::new(), ECHO).await;

    assert_eq!(*result.as_ref().unwrap(), ServingStatus::Serving);
    assert_eq!(exit_code(&result), EXIT_SERVING);
    assert_eq!(render(ECHO, &result).body, "echo.EchoServer SERVING");
}

/// Empty name asks for the overall server status
#[tokio::test]
async fn test_overall_status() {
    let server = ExampleServer::start(ExampleHealthService::new(100)).await;
    let prober = prober(server.probe_config());

    let result = prober.check(&CancellationToken::new(), "").await;
    assert_eq!(*result.as_ref().unwrap(), ServingStatus::Serving);
}

/// Unknown service: ServiceNotFound with SERVICE_UNKNOWN, exit 3
#[tokio::test]
async fn test_service_not_found() {
    let server = ExampleServer::start(ExampleHealthService::new(0)).await;
    let prober = prober(server.probe_config());

    let result = prober.check(&CancellationToken::new(), "missing.Svc").await;

    let err = result.as_ref().unwrap_err();
    assert!(matches!(err, ProbeError::ServiceNotFound(_)), "{err}");
    assert_eq!(err.serving_status(), ServingStatus::ServiceUnknown);
    assert_eq!(exit_code(&result), EXIT_SERVICE_NOT_FOUND);
    assert_eq!(render("missing.Svc", &result).body, "missing.Svc ServiceNotFound");
}

/// Unhealthy probability 100: NOT_SERVING on every check, exit 5
#[tokio::test]
async fn test_always_unhealthy() {
    let server = ExampleServer::start(ExampleHealthService::new(100)).await;
    let prober = prober(server.probe_config());

    for _ in 0..5 {
        let result = prober.check(&CancellationToken::new(), ECHO).await;
        assert_eq!(*result.as_ref().unwrap(), ServingStatus::NotServing);
        assert_eq!(exit_code(&result), EXIT_UNHEALTHY);
    }
}

/// Repeated probes against a serving peer stay serving
#[tokio::test]
async fn test_repeated_probes_are_stable() {
    let server = ExampleServer::start(ExampleHealthService::new(0)).await;
    let prober = prober(server.probe_config());

    for _ in 0..20 {
        let result = prober.check(&CancellationToken::new(), ECHO).await;
        assert_eq!(*result.as_ref().unwrap(), ServingStatus::Serving);
    }
}

/// A peer without the health service never looks healthy
#[tokio::test]
async fn test_unimplemented_peer() {
    let service = ExampleHealthService::new(0).with_behavior(Behavior::Unimplemented);
    let server = ExampleServer::start(service).await;
    let prober = prober(server.probe_config());

    let result = prober.check(&CancellationToken::new(), ECHO).await;

    let err = result.as_ref().unwrap_err();
    assert!(matches!(err, ProbeError::Unimplemented(_)), "{err}");
    assert_eq!(exit_code(&result), EXIT_UNIMPLEMENTED);
    assert_ne!(render(ECHO, &result).status.as_u16(), 200);
}

/// Slow peer: the call phase times out as RPCFailure, exit 2
#[tokio::test]
async fn test_rpc_timeout() {
    let service = ExampleHealthService::new(0).with_delay(Duration::from_secs(3));
    let server = ExampleServer::start(service).await;
    let config = server
        .probe_config()
        .with_timeouts(Duration::from_secs(2), Duration::from_millis(300));
    let prober = prober(config);

    let start = Instant::now();
    let result = prober.check(&CancellationToken::new(), ECHO).await;

    let err = result.as_ref().unwrap_err();
    assert!(matches!(err, ProbeError::RpcFailure(_)), "{err}");
    assert_eq!(exit_code(&result), EXIT_RPC_FAILURE);
    assert!(start.elapsed() < Duration::from_secs(2));
}

/// Cancelling mid-call stops the probe promptly
#[tokio::test]
async fn test_cancel_during_call() {
    let service = ExampleHealthService::new(0).with_delay(Duration::from_secs(5));
    let server = ExampleServer::start(service).await;
    let config = server
        .probe_config()
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(10));
    let prober = prober(config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = prober.check(&cancel, ECHO).await;

    // A local cancellation is not a deadline expiry
    let err = result.as_ref().unwrap_err();
    assert!(matches!(err, ProbeError::UnknownFailure(_)), "{err}");
    assert_ne!(exit_code(&result), EXIT_SERVING);
    assert!(start.elapsed() < Duration::from_secs(4));
}

/// Skipping verification while naming a CA is rejected before any I/O
#[test]
fn test_no_verify_with_ca_bundle_rejected() {
    let tls = ProbeTlsConfig {
        ca_cert: Some("/nonexistent/ca.pem".into()),
        ..ProbeTlsConfig::no_verify()
    };

    let err = CredentialBuilder::build(&tls).unwrap_err();
    assert!(matches!(err, CredentialError::Invalid(_)), "{err}");
}
