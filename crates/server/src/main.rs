//! testsync server.
//!
//! Serves the HTTP payload API and the WebSocket registration endpoint
//! until SIGINT or SIGTERM, then shuts both down, stops the cleaner and
//! closes the data store.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use testsync_engine::{ServerConfig, TestCleaner, TestDataService, TestDirectory};
use testsync_executor::Executor;
use testsync_server::logging::{self, LogTarget};
use testsync_server::{serve_http, serve_ws, AppState};

use cli::build_cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();
    let config_dir = matches
        .get_one::<String>("config-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(cli::DEFAULT_CONFIG_DIR));

    let config = ServerConfig::load_or_init(&config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;
    let log_target = logging::init(&config.logging).context("installing logger")?;

    info!(
        target: "testsync::server",
        config_dir = %config_dir.display(),
        http_port = config.http_port,
        ws_port = config.ws_port,
        storage = %config.storage.kind,
        auth = !config.sync_client.is_empty(),
        "Starting testsync"
    );
    if log_target == LogTarget::Stderr {
        warn!(target: "testsync::server", "File logging unavailable");
    }

    run(config).await
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store = testsync_storage::open_store(&config.storage).context("opening data store")?;
    let directory = Arc::new(TestDirectory::new());
    let service = Arc::new(TestDataService::new(Arc::clone(&directory), Arc::clone(&store)));
    let executor = Arc::new(Executor::new(service));
    let state = AppState::new(executor, config.sync_client.clone(), config.keepalive());

    let cleaner = TestCleaner::new(
        Arc::clone(&directory),
        Arc::clone(&store),
        config.cleanup_interval(),
        config.retention(),
    );
    let cleaner_handle = cleaner.start().context("starting cleaner thread")?;

    let http_listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("binding HTTP port {}", config.http_port))?;
    let ws_listener = TcpListener::bind(("0.0.0.0", config.ws_port))
        .await
        .with_context(|| format!("binding WebSocket port {}", config.ws_port))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let http = tokio::spawn(serve_http(
        http_listener,
        state.clone(),
        stopped(stop_rx.clone()),
    ));
    let ws = tokio::spawn(serve_ws(ws_listener, state.clone(), stopped(stop_rx)));

    wait_for_signal().await;
    info!(target: "testsync::server", "Shutting down");

    let _ = stop_tx.send(true);
    let closed = state.disconnect_all();
    info!(target: "testsync::server", connections = closed, "Closed registered connections");

    for (name, handle) in [("HTTP", http), ("WebSocket", ws)] {
        match handle.await {
            Ok(Ok(())) => info!(target: "testsync::server", server = name, "Server stopped"),
            Ok(Err(e)) => error!(target: "testsync::server", server = name, error = %e, "Server failed"),
            Err(e) => error!(target: "testsync::server", server = name, error = %e, "Server task panicked"),
        }
    }

    cleaner.shutdown();
    match tokio::task::spawn_blocking(move || cleaner_handle.join()).await {
        Ok(Ok(())) => {}
        _ => error!(target: "testsync::server", "Cleaner thread did not stop cleanly"),
    }

    if let Err(e) = store.close() {
        error!(target: "testsync::server", error = %e, "Could not close data store");
    }

    info!(target: "testsync::server", "Shutdown complete");
    Ok(())
}

/// Resolves once `true` is published on the stop channel.
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(target: "testsync::server", error = %e, "Could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(target: "testsync::server", error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target: "testsync::server", "Received SIGINT"),
        _ = terminate => info!(target: "testsync::server", "Received SIGTERM"),
    }
}
