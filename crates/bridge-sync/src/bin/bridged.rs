//! # bridged: Kounta Bridge Daemon
//!
//! Long-running sync daemon for the Kounta bridge.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  config file ──► validate ──► SQLite (migrate) ──► hydrate tokens       │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │  ApiClient + RateLimiter ──► SyncService + OrderService                 │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │  SyncScheduler task ──── runs until SIGINT / SIGTERM                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Configuration path comes from the first CLI argument, then the
//! `BRIDGE_CONFIG` environment variable, then `bridge.toml`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bridge_db::{Database, DbConfig};
use bridge_sync::{
    ApiClient, BridgeConfig, InMemoryStorefront, OrderService, RateLimiter, Storefront,
    SyncScheduler, SyncService,
};

fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BRIDGE_CONFIG").ok())
        .unwrap_or_else(|| "bridge.toml".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting bridged");

    let path = config_path();
    let mut config = BridgeConfig::load(&path)?;
    info!(
        config = %path,
        site_id = config.sync.site_id,
        interval_secs = config.sync.interval_secs,
        orders_enabled = config.orders.enabled,
        "Configuration loaded"
    );

    let db = Database::new(DbConfig::new(&config.database.path)).await?;
    let purged = db.kv().purge_expired().await?;
    info!(path = %config.database.path, purged, "Database ready");

    // Stored tokens outrank the file: a refresh on a previous run may have
    // rotated them
    config.hydrate_tokens(&db.kv()).await?;

    let limiter = RateLimiter::new(
        db.kv(),
        config.sync.rate_limit_max_requests,
        Duration::from_secs(config.sync.rate_limit_window_secs),
    );
    let api = Arc::new(ApiClient::new(&config.api, db.kv(), limiter)?);

    // Stand-in until a concrete storefront backend is wired; the sync core
    // only ever sees the Storefront trait
    let storefront: Arc<dyn Storefront> = Arc::new(InMemoryStorefront::new());
    warn!("No storefront backend configured, running against the in-memory stand-in");

    let sync = Arc::new(SyncService::new(
        db.clone(),
        api.clone(),
        storefront.clone(),
        config.sync.clone(),
    ));

    let orders = config.orders.enabled.then(|| {
        Arc::new(OrderService::new(
            db.clone(),
            api.clone(),
            storefront.clone(),
            config.orders.clone(),
            config.sync.site_id,
        ))
    });

    let interval = Duration::from_secs(config.sync.interval_secs);
    let (scheduler, handle) = SyncScheduler::new(sync, orders, interval);
    let scheduler_task = tokio::spawn(scheduler.run());

    shutdown_signal().await;

    handle.shutdown().await?;
    scheduler_task.await?;
    db.close().await;

    info!("bridged shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
