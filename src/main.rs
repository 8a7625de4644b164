use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use grpc_health_proxy::config::{Config, RunMode};
use grpc_health_proxy::observability::{Metrics, MetricsRecorder};
use grpc_health_proxy::output::{exit_code, render, EXIT_STARTUP_FAILURE};
use grpc_health_proxy::probe::{CredentialBuilder, Prober};
use grpc_health_proxy::{logging, Server, VERSION};

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return startup_failure();
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return startup_failure();
    }

    info!("Starting grpc_health_proxy {}", VERSION);
    config.log_summary();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build runtime: {}", e);
            return startup_failure();
        }
    };

    let code = runtime.block_on(async_main(config));
    ExitCode::from(code)
}

async fn async_main(config: Config) -> u8 {
    let credentials = match CredentialBuilder::build(&config.probe.tls) {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("Failed to load gRPC credentials: {}", e);
            return EXIT_STARTUP_FAILURE as u8;
        }
    };

    let metrics = match Metrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            error!("Failed to register metrics: {}", e);
            return EXIT_STARTUP_FAILURE as u8;
        }
    };

    let recorder: Arc<dyn MetricsRecorder> = metrics.clone();
    let prober = Prober::new(
        Arc::new(config.probe.clone()),
        Arc::new(credentials),
        recorder,
    );

    match config.mode {
        RunMode::Cli => run_once(&prober).await,
        RunMode::Server => serve(&config, prober, metrics).await,
    }
}

/// Probe once and map the result to an exit code.
async fn run_once(prober: &Prober) -> u8 {
    let service_name = prober.config().service_name.clone().unwrap_or_default();
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        })
    };

    let result = prober.check(&cancel, &service_name).await;
    watcher.abort();

    let code = exit_code(&result);
    let response = render(&service_name, &result);
    if code == 0 {
        println!("{}", response.body);
    } else {
        eprintln!("{}", response.body);
    }

    code as u8
}

async fn serve(config: &Config, prober: Prober, metrics: Arc<Metrics>) -> u8 {
    let server = match Server::bind(&config.server, prober, metrics).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return EXIT_STARTUP_FAILURE as u8;
        }
    };

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    match server.run().await {
        Ok(()) => {
            info!("Server stopped");
            0
        }
        Err(e) => {
            error!("Server error: {}", e);
            EXIT_STARTUP_FAILURE as u8
        }
    }
}

fn startup_failure() -> ExitCode {
    ExitCode::from(EXIT_STARTUP_FAILURE as u8)
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
