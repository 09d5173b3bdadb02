//! Cadence Binary Entry Point
//!
//! Runs the sampler and the read-only HTTP API in one process.
//! Core functionality is provided by the `cadence` library crate.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use cadence::{
    config::AppConfig,
    sampler::Lifecycle,
    server::{AppState, create_router},
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Cadence - periodic sampler with a durable observation store
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "CADENCE_CONFIG"
    )]
    config: PathBuf,

    /// Server bind address (overrides config file)
    #[arg(long, env = "CADENCE_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "CADENCE_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database file path (overrides config file)
    #[arg(long, env = "CADENCE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "CADENCE_LOG_FORMAT")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,cadence=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    tracing::info!("Cadence - periodic sampler");

    tracing::info!(path = %cli.config.display(), "Loading configuration");
    let mut config = AppConfig::load(&cli.config)?;

    // CLI > ENV > config file
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    config.validate()?;

    tracing::info!(
        server = %config.server_addr(),
        database = %config.database.path.display(),
        jobs = config.jobs.len(),
        "Configuration loaded"
    );

    let lifecycle = Arc::new(Lifecycle::from_config(&config)?);
    lifecycle.init().await?;
    lifecycle.start().await?;

    let app = create_router(AppState {
        query: lifecycle.query()?,
        sampler: lifecycle.state().clone(),
    });

    let addr: SocketAddr = config.server_addr().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop sampling and flush storage even if the server failed.
    lifecycle.shutdown().await?;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
