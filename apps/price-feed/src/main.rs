//! Price Feed Binary
//!
//! Runs the loopback price feed and logs the aggregated snapshot.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-feed
//! PRICE_FEED_LOCAL_ECHO=true cargo run --bin price-feed
//! ```
//!
//! # Environment Variables
//!
//! - `PRICE_FEED_URL`: Echo endpoint (default: <wss://ws.postman-echo.com/raw>)
//! - `PRICE_FEED_LOCAL_ECHO`: Run a local echo server instead (default: false)
//! - `PRICE_FEED_LOCAL_ECHO_PORT`: Local echo server port (default: any free port)
//! - `PRICE_FEED_SYMBOLS`: Comma-separated watch list (default: 30 large caps)
//! - `PRICE_FEED_TICK_INTERVAL_MS`: Generator interval (default: 2000)
//! - `RUST_LOG`: Log filter (default: `price_feed=info`)

use std::sync::Arc;

use anyhow::Context;
use price_feed::infrastructure::echo::ConnectionError;
use price_feed::infrastructure::metrics::get_metrics_handle;
use price_feed::{
    ConnectionState, EchoPriceService, EchoServer, EchoServiceConfig, FeedAggregator, FeedConfig,
    FeedSnapshot, RunningEchoServer, init_metrics, init_telemetry,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Rows logged per snapshot.
const SNAPSHOT_LOG_ROWS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    init_telemetry().context("failed to initialize tracing")?;

    tracing::info!("Starting price feed");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let mut config = FeedConfig::from_env().context("invalid configuration")?;

    let local_echo = if config.endpoint.local_echo {
        let server = EchoServer::bind(("127.0.0.1", config.endpoint.local_echo_port))
            .await
            .context("failed to bind local echo server")?
            .spawn();
        config.endpoint.url = server.url().to_string();
        Some(server)
    } else {
        None
    };

    log_config(&config);

    let service = EchoPriceService::spawn_with_error_callback(
        EchoServiceConfig::from(&config),
        Arc::new(|error: &ConnectionError| {
            tracing::error!(error = %error, "Price feed connection error");
        }),
    )
    .context("invalid service configuration")?;

    let aggregator = FeedAggregator::new(Arc::new(service), config.symbols.as_slice())
        .await
        .context("failed to subscribe watch list")?;

    let shutdown_token = CancellationToken::new();
    tokio::spawn(log_snapshots(
        aggregator.snapshots(),
        shutdown_token.clone(),
    ));
    tokio::spawn(log_connection_states(
        aggregator.connection_states(),
        shutdown_token.clone(),
    ));

    aggregator.start().await?;
    tracing::info!("Price feed ready");

    await_shutdown(&shutdown_token).await;

    aggregator.stop().await?;
    drop(aggregator);

    if let Some(server) = local_echo {
        shutdown_echo_server(server).await;
    }

    if let Some(handle) = get_metrics_handle() {
        tracing::debug!(metrics = %handle.render(), "Final metrics");
    }

    tracing::info!("Price feed stopped");
    Ok(())
}

/// Log the top rows of every published snapshot.
async fn log_snapshots(
    mut snapshots: tokio::sync::watch::Receiver<FeedSnapshot>,
    shutdown_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let top: Vec<String> = snapshot
                    .iter()
                    .take(SNAPSHOT_LOG_ROWS)
                    .map(ToString::to_string)
                    .collect();
                tracing::info!(rows = snapshot.len(), top = ?top, "Snapshot updated");
            }
        }
    }
}

/// Log connection state transitions.
async fn log_connection_states(
    mut states: tokio::sync::watch::Receiver<ConnectionState>,
    shutdown_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                match state {
                    ConnectionState::Connected => tracing::info!("Echo endpoint connected"),
                    ConnectionState::Disconnected => tracing::warn!("Echo endpoint disconnected"),
                }
            }
        }
    }
}

async fn shutdown_echo_server(server: RunningEchoServer) {
    let addr = server.local_addr();
    server.shutdown().await;
    tracing::info!(%addr, "Local echo server stopped");
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        url = %config.endpoint.url,
        local_echo = config.endpoint.local_echo,
        symbols = config.symbols.len(),
        tick_interval_ms = config.generator.tick_interval.as_millis(),
        "Configuration loaded"
    );
    tracing::debug!(symbols = ?config.symbols, "Watch list");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: &CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
