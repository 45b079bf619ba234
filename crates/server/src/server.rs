//! Process lifecycle: open the store, serve, initialise the chain, shut down.

use anyhow::{Context, Result};
use tinyledger_chain::Ledger;
use tinyledger_storage::Storage;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::api::{build_router, AppState};
use crate::config::ServerConfig;

/// Run the server until SIGINT or SIGTERM.
///
/// Requests are accepted as soon as the listener is bound but answered with
/// 503 until the genesis block is known to exist. Failing to open the store,
/// bind, or create genesis returns an error before any request is served.
pub async fn run(config: ServerConfig) -> Result<()> {
    let storage = Storage::open(&config.data_dir)
        .with_context(|| format!("failed to open store at {}", config.data_dir.display()))?;
    let ledger = Ledger::new(storage.clone());
    let state = AppState::new(ledger.clone());

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, data_dir = %config.data_dir.display(), "server listening");

    let app = build_router(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let genesis = tokio::task::spawn_blocking(move || ledger.ensure_genesis()).await;
    let root = match genesis {
        Ok(Ok(root)) => root,
        Ok(Err(err)) => {
            server.abort();
            return Err(err).context("failed creating genesis block");
        }
        Err(err) => {
            server.abort();
            return Err(err).context("genesis task panicked");
        }
    };

    state.mark_ready();
    info!(genesis = %root, "ledger ready");

    server
        .await
        .context("server task panicked")?
        .context("server error")?;

    storage.flush().context("failed to flush store on shutdown")?;
    info!("store flushed, bye");
    Ok(())
}

/// Resolve on Ctrl-C (SIGINT) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
