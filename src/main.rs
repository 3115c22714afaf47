//! ICU Receiver binary entry point.

use std::net::SocketAddr;

use clap::Parser;
use icu_receiver::{
    config::AppConfig,
    server::{AppState, create_router},
    storage::{StorageBuilder, StorageHandles},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ICU Receiver - bedside telemetry ingestion service
#[derive(Parser, Debug)]
#[command(name = "icu-receiver", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/config.yaml", env = "ICU_CONFIG")]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "ICU_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "ICU_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, env = "ICU_DB_URL")]
    db_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,icu_receiver=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!(path = %cli.config, "Loading configuration");
    let mut config = AppConfig::load(&cli.config)?;

    // CLI > ENV > config file
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(dsn) = cli.db_url {
        config.database.dsn = dsn;
    }
    config.validate()?;

    let cb = &config.resilience.circuit_breaker;
    let retry = &config.resilience.retry;
    tracing::info!(
        driver = %config.database.driver,
        dsn = %config.database.dsn,
        failure_rate_threshold = cb.failure_rate_threshold,
        sliding_window_size = cb.sliding_window_size,
        open_wait = %humantime::format_duration(cb.wait_duration_in_open_state),
        retry_attempts = retry.max_attempts,
        retry_wait = %humantime::format_duration(retry.wait_duration),
        "Configuration loaded"
    );

    let handles = StorageBuilder::new(&config.database.dsn)
        .driver(config.database.driver)
        .max_connections(config.database.max_connections)
        .build()
        .await?;

    let state = AppState::new(handles.store.clone(), &config.resilience)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("ICU receiver listening on: http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_storage(handles).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_storage(handles: StorageHandles) {
    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown().await {
        tracing::error!("Failed to shutdown storage: {}", e);
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }
}
