//! memcached backend gateway
//!
//! Serves the cache adapter over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memcached_backend::api::{create_router, AppState};
use memcached_backend::config::{BackendKind, Config};
use memcached_backend::transport::LocalTransport;
use memcached_backend::{spawn_cleanup_task, MemcachedCache};

/// Main entry point for the gateway.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Open the configured transport
/// 4. Start the expiry sweep when running in-process
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memcached_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting memcached backend gateway");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: backend={:?}, servers={:?}, binary={}, pool_size={}, port={}",
        config.backend, config.servers, config.binary, config.pool_size, config.server_port
    );

    let (cache, cleanup_handle) = match config.backend {
        BackendKind::Local => {
            let local = Arc::new(LocalTransport::new(config.local_max_entries));
            let handle = spawn_cleanup_task(local.clone(), config.cleanup_interval);
            info!("Background expiry sweep started");
            (MemcachedCache::new(local, &config), Some(handle))
        }
        BackendKind::Memcached => {
            // Connecting the pool does blocking IO
            let pool_config = config.clone();
            let cache = tokio::task::spawn_blocking(move || MemcachedCache::from_config(&pool_config))
                .await
                .context("transport setup panicked")?
                .context("failed to connect to memcached")?;
            (cache, None)
        }
    };
    info!("Cache adapter initialized on {} transport", cache.transport_name());

    let app = create_router(AppState::new(cache));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the expiry sweep if one is running.
async fn shutdown_signal(cleanup_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
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
                warn!("Failed to install SIGTERM handler: {}", err);
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

    if let Some(handle) = cleanup_handle {
        handle.abort();
        warn!("Expiry sweep aborted");
    }
}
