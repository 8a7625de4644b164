//! Reference gRPC health server.
//!
//! Serves `grpc.health.v1.Health` for `echo.EchoServer` (or
//! `EXAMPLE_SERVICE_NAME`), reporting NOT_SERVING with probability
//! `EXAMPLE_UNHEALTHY_PROBABILITY` percent on each check.

use std::process::ExitCode;

use tokio::net::TcpListener;
use tonic::transport::Identity;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use grpc_health_proxy::example::{self, ExampleConfig};
use grpc_health_proxy::VERSION;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "example_server=info,grpc_health_proxy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ExampleConfig::from_env()?;

    let identity = match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => {
            let cert = tokio::fs::read(cert).await?;
            let key = tokio::fs::read(key).await?;
            Some(Identity::from_pem(cert, key))
        }
        _ => None,
    };

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        version = VERSION,
        addr = %listener.local_addr()?,
        service = %config.monitored_service,
        unhealthy_probability = config.unhealthy_probability,
        behavior = ?config.behavior,
        tls = identity.is_some(),
        "Example health server listening"
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    };

    example::serve(config.service(), listener, identity, shutdown).await?;
    Ok(())
}
