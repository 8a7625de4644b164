//! Probes over TLS against a TLS example server.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use grpc_health_proxy::config::{ProbeConfig, ProbeTlsConfig};
use grpc_health_proxy::example::ExampleHealthService;
use grpc_health_proxy::probe::{CredentialBuilder, CredentialError, ProbeError, ServingStatus};

use crate::helpers::*;

async fn tls_upstream(pki: &TestPki) -> ExampleServer {
    ExampleServer::start_with_identity(ExampleHealthService::new(0), Some(pki.identity())).await
}

fn tls_config(server: &ExampleServer, tls: ProbeTlsConfig) -> ProbeConfig {
    ProbeConfig::new(server.addr.to_string())
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(2))
        .with_tls(tls)
}

/// CA bundle plus SNI override verifies a certificate issued for localhost
#[tokio::test]
async fn test_ca_bundle_with_sni_override() {
    let pki = TestPki::new(&["localhost"]);
    let server = tls_upstream(&pki).await;

    let tls = ProbeTlsConfig::verify(Some(&pki.ca_path)).with_sni_server_name("localhost");
    let prober = prober(tls_config(&server, tls));

    let result = prober.check(&CancellationToken::new(), ECHO).await;
    assert_eq!(*result.as_ref().unwrap(), ServingStatus::Serving);
}

/// Without the override the IP address does not match the certificate
#[tokio::test]
async fn test_name_mismatch_is_connection_failure() {
    let pki = TestPki::new(&["localhost"]);
    let server = tls_upstream(&pki).await;

    let tls = ProbeTlsConfig::verify(Some(&pki.ca_path));
    let prober = prober(tls_config(&server, tls));

    let result = prober.check(&CancellationToken::new(), ECHO).await;
    let err = result.as_ref().unwrap_err();
    assert!(matches!(err, ProbeError::ConnectionFailure(_)), "{err}");
}

/// Certificate from an untrusted CA is rejected
#[tokio::test]
async fn test_untrusted_ca_is_connection_failure() {
    let pki = TestPki::new(&["localhost"]);
    let other = TestPki::new(&["localhost"]);
    let server = tls_upstream(&pki).await;

    let tls = ProbeTlsConfig::verify(Some(&other.ca_path)).with_sni_server_name("localhost");
    let prober = prober(tls_config(&server, tls));

    let result = prober.check(&CancellationToken::new(), ECHO).await;
    assert!(matches!(
        result,
        Err(ProbeError::ConnectionFailure(_))
    ));
}

/// Skipping verification accepts any certificate
#[tokio::test]
async fn test_no_verify() {
    let pki = TestPki::new(&["some.other.name"]);
    let server = tls_upstream(&pki).await;

    let prober = prober(tls_config(&server, ProbeTlsConfig::no_verify()));

    let result = prober.check(&CancellationToken::new(), ECHO).await;
    assert_eq!(*result.as_ref().unwrap(), ServingStatus::Serving);
}

/// Missing or empty CA bundles fail at startup
#[test]
fn test_bad_ca_bundle() {
    let pki = TestPki::new(&["localhost"]);

    let missing = ProbeTlsConfig::verify(Some(pki.ca_path.with_file_name("absent.pem")));
    assert!(matches!(
        CredentialBuilder::build(&missing),
        Err(CredentialError::Read { .. })
    ));

    let empty = ProbeTlsConfig::verify(Some(pki.write("empty.pem", "")));
    assert!(matches!(
        CredentialBuilder::build(&empty),
        Err(CredentialError::NoCertificates { .. })
    ));
}
