//! Cache Proxy - A forwarding HTTP/1.0 proxy with an in-memory object cache
//!
//! Usage: `cache_proxy <PORT> [--admin-port <PORT>]`

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_proxy::api::create_router;
use cache_proxy::{AppState, Config, ObjectCache, ProxyServer};

/// Main entry point for the caching proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Parse the command line
/// 3. Create the shared object cache
/// 4. Start the admin API if an admin port is configured
/// 5. Accept proxy connections until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    info!(
        port = config.port,
        admin_port = ?config.admin_port,
        max_cache_size = config.max_cache_size,
        max_object_size = config.max_object_size,
        "Configuration loaded"
    );

    let cache = ObjectCache::from_config(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let admin = match config.admin_addr() {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind admin API on {addr}"))?;
            info!("Admin API listening on http://{}", addr);

            let app = create_router(AppState::new(cache.clone()));
            let shutdown = wait_for(shutdown_rx.clone());
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown)
                    .await
            }))
        }
        None => None,
    };

    let listen_addr = config.listen_addr();
    let server = ProxyServer::bind(listen_addr, cache)
        .await
        .with_context(|| format!("Failed to listen on port {}", config.port))?;
    info!("Proxy listening on {}", server.local_addr()?);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    server.run(wait_for(shutdown_rx)).await;

    if let Some(admin) = admin {
        admin
            .await
            .context("Admin API task panicked")?
            .context("Admin API failed")?;
    }

    info!("Proxy shutdown complete");
    Ok(())
}

/// Resolves once the shutdown flag flips.
async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
