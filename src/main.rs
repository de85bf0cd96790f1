//! Adaptive Cache - admin server
//!
//! Runs the store, the computation unit and the maintenance task behind a
//! small admin HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adaptive_cache::api::{create_router, AppState};
use adaptive_cache::cache::{Clock, MemoryStore, SystemClock};
use adaptive_cache::config::Config;
use adaptive_cache::tasks::spawn_maintenance_task;
use adaptive_cache::worker::{ComputationUnit, WorkerClient};

/// Main entry point for the adaptive cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Restore the store from its snapshot, if one is configured and present
/// 4. Spawn the computation unit and its client
/// 5. Start the background maintenance task
/// 6. Start HTTP server on configured port
/// 7. On SIGINT/SIGTERM stop maintenance and write the snapshot
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Adaptive Cache Server");

    let config = Config::from_env();
    info!(
        default_ttl_ms = config.default_ttl_ms,
        worker_timeout_ms = config.worker_timeout_ms,
        max_cache_bytes = config.max_cache_bytes,
        max_entries = config.max_entries,
        port = config.server_port,
        maintenance_interval = config.maintenance_interval,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = match &config.snapshot_path {
        Some(path) if path.exists() => MemoryStore::load_snapshot(path, clock.clone())
            .with_context(|| format!("loading snapshot {}", path.display()))?,
        _ => MemoryStore::new(clock.clone()),
    };
    let store = Arc::new(store);
    info!(entries = store.len(), "Cache store initialized");

    let worker = Arc::new(WorkerClient::spawn(
        ComputationUnit::default(),
        config.worker_timeout(),
    ));
    let state = AppState::new(store.clone(), worker.clone(), clock.clone(), &config);

    let maintenance_handle = spawn_maintenance_task(
        store.clone(),
        state.tracker.clone(),
        worker,
        config.maintenance_budget(),
        config.maintenance_interval,
        clock,
    );
    info!("Background maintenance task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    maintenance_handle.abort();
    warn!("Maintenance task aborted");

    if let Some(path) = &config.snapshot_path {
        let written = store
            .save_snapshot(path)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        info!(entries = written, path = %path.display(), "Snapshot written");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
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
