//! Server mode tests: health path, query parameter, metrics endpoint.

use std::time::Duration;

use reqwest::StatusCode;

use grpc_health_proxy::config::ProbeConfig;
use grpc_health_proxy::example::{Behavior, ExampleHealthService};

use crate::helpers::*;

/// Serving service answers 200 with a plain-text body
#[tokio::test]
async fn test_serving_returns_200() {
    let upstream = ExampleServer::start(ExampleHealthService::new(0)).await;
    let proxy = ProxyServer::start(upstream.probe_config()).await;

    let resp = proxy.health("serviceName=echo.EchoServer").await;
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/plain")));

    let body = status_and_body(resp, StatusCode::OK).await;
    assert!(body.contains("echo.EchoServer SERVING"), "body: {}", body);
}

/// Unknown service answers 404 `<service> ServiceNotFound`
#[tokio::test]
async fn test_unknown_service_returns_404() {
    let upstream = ExampleServer::start(ExampleHealthService::new(0)).await;
    let proxy = ProxyServer::start(upstream.probe_config()).await;

    let resp = proxy.health("serviceName=missing.Svc").await;
    let body = status_and_body(resp, StatusCode::NOT_FOUND).await;
    assert_eq!(body, "missing.Svc ServiceNotFound");
}

/// Unhealthy service answers 502
#[tokio::test]
async fn test_not_serving_returns_502() {
    let upstream = ExampleServer::start(ExampleHealthService::new(100)).await;
    let proxy = ProxyServer::start(upstream.probe_config()).await;

    let resp = proxy.health("serviceName=echo.EchoServer").await;
    let body = status_and_body(resp, StatusCode::BAD_GATEWAY).await;
    assert_eq!(body, "echo.EchoServer NOT_SERVING");
}

/// Unreachable upstream answers 502 ConnectionFailure
#[tokio::test]
async fn test_unreachable_upstream_returns_502() {
    let addr = closed_addr().await;
    let config = ProbeConfig::new(addr.to_string())
        .with_timeouts(Duration::from_secs(1), Duration::from_secs(1));
    let proxy = ProxyServer::start(config).await;

    let resp = proxy.health("serviceName=echo.EchoServer").await;
    let body = status_and_body(resp, StatusCode::BAD_GATEWAY).await;
    assert!(
        body.starts_with("echo.EchoServer ConnectionFailure: "),
        "body: {}",
        body
    );
}

/// Peer without the health service answers 501, never 200
#[tokio::test]
async fn test_unimplemented_returns_501() {
    let service = ExampleHealthService::new(0).with_behavior(Behavior::Unimplemented);
    let upstream = ExampleServer::start(service).await;
    let proxy = ProxyServer::start(upstream.probe_config()).await;

    let resp = proxy.health("serviceName=echo.EchoServer").await;
    let body = status_and_body(resp, StatusCode::NOT_IMPLEMENTED).await;
    assert!(body.starts_with("echo.EchoServer Unimplemented: "), "body: {}", body);
}

/// A configured service name wins over the query parameter
#[tokio::test]
async fn test_fixed_service_name_ignores_query() {
    let upstream = ExampleServer::start(ExampleHealthService::new(0)).await;
    let proxy = ProxyServer::start(upstream.probe_config().with_service_name(ECHO)).await;

    let resp = proxy.health("serviceName=missing.Svc").await;
    let body = status_and_body(resp, StatusCode::OK).await;
    assert_eq!(body, "echo.EchoServer SERVING");
}

/// No query parameter probes the overall status
#[tokio::test]
async fn test_missing_query_probes_overall_status() {
    let upstream = ExampleServer::start(ExampleHealthService::new(100)).await;
    let proxy = ProxyServer::start(upstream.probe_config()).await;

    let resp = proxy.health("").await;
    let body = status_and_body(resp, StatusCode::OK).await;
    assert_eq!(body, " SERVING");
}

/// Other paths answer 404 without probing
#[tokio::test]
async fn test_other_path_returns_404() {
    let addr = closed_addr().await;
    let proxy = ProxyServer::start(ProbeConfig::new(addr.to_string())).await;

    let url = proxy.health_url.replace("/healthz", "/other");
    let resp = proxy.get(&url).await;
    status_and_body(resp, StatusCode::NOT_FOUND).await;
}

/// Concurrent requests each run their own probe
#[tokio::test]
async fn test_concurrent_requests() {
    let upstream = ExampleServer::start(ExampleHealthService::new(0)).await;
    let proxy = ProxyServer::start(upstream.probe_config()).await;

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..10 {
        let client = proxy.client.clone();
        let url = format!("{}?serviceName=echo.EchoServer", proxy.health_url);
        set.spawn(async move { client.get(url).send().await });
    }

    while let Some(result) = set.join_next().await {
        let resp = result.unwrap().expect("GET request failed");
        status_and_body(resp, StatusCode::OK).await;
    }
}

/// Metrics endpoint exposes the probe series after a request
#[tokio::test]
async fn test_metrics_exposition() {
    let upstream = ExampleServer::start(ExampleHealthService::new(0)).await;
    let proxy = ProxyServer::start(upstream.probe_config()).await;

    status_and_body(
        proxy.health("serviceName=echo.EchoServer").await,
        StatusCode::OK,
    )
    .await;
    status_and_body(
        proxy.health("serviceName=missing.Svc").await,
        StatusCode::NOT_FOUND,
    )
    .await;

    let resp = proxy.get(&proxy.metrics_url).await;
    let body = status_and_body(resp, StatusCode::OK).await;

    assert!(body.contains("grpc_health_check_seconds"), "{}", body);
    assert!(body.contains("grpc_health_check_service_duration_seconds"));
    assert!(body.contains("grpc_health_check_phase_duration_seconds"));
    assert!(body.contains(r#"phase="connect""#));
    assert!(body.contains(
        r#"grpc_health_check_service_requests{code="SERVING",service_name="echo.EchoServer"} 1"#
    ));
    assert!(body.contains(
        r#"grpc_health_check_service_requests{code="NotFound",service_name="missing.Svc"} 1"#
    ));

    let url = proxy.metrics_url.replace("/metrics", "/other");
    status_and_body(proxy.get(&url).await, StatusCode::NOT_FOUND).await;
}

/// A client that goes away takes its upstream call with it
#[tokio::test]
async fn test_client_disconnect_abandons_upstream_call() {
    let upstream = SilentUpstream::start().await;
    let config = ProbeConfig::new(upstream.addr.to_string())
        .with_timeouts(Duration::from_secs(30), Duration::from_secs(30));
    let proxy = ProxyServer::start(config).await;

    let client = proxy.client.clone();
    let url = format!("{}?serviceName=echo.EchoServer", proxy.health_url);
    let request = tokio::spawn(async move { client.get(url).send().await });

    tokio::time::timeout(Duration::from_secs(5), upstream.accepted())
        .await
        .expect("Proxy never dialled the upstream");
    // Let the request settle into waiting on the upstream
    tokio::time::sleep(Duration::from_millis(200)).await;

    request.abort();
    let start = std::time::Instant::now();
    tokio::time::timeout(Duration::from_secs(5), upstream.closed())
        .await
        .expect("Upstream connection still open after the client went away");
    assert!(start.elapsed() < Duration::from_secs(5));

    // The proxy keeps serving
    let resp = proxy.get(&proxy.metrics_url).await;
    status_and_body(resp, StatusCode::OK).await;
}

/// Shutdown completes while the upstream is slow
#[tokio::test]
async fn test_graceful_shutdown() {
    let service = ExampleHealthService::new(0).with_delay(Duration::from_secs(30));
    let upstream = ExampleServer::start(service).await;
    let config = upstream
        .probe_config()
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(30));
    let proxy = ProxyServer::start(config).await;

    let client = proxy.client.clone();
    let url = format!("{}?serviceName=echo.EchoServer", proxy.health_url);
    let pending = tokio::spawn(async move { client.get(url).send().await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let start = std::time::Instant::now();
    proxy.stop().await;
    assert!(start.elapsed() < Duration::from_secs(12));

    // In-flight probe was cancelled rather than left waiting on the peer
    if let Ok(Ok(resp)) = pending.await {
        assert_ne!(resp.status(), StatusCode::OK);
    }
}
