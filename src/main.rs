//! Remuda Proxy Manager - Entry Point
//!
//! Loads pool definitions, brings up the health store, and runs the
//! background monitor with graceful shutdown support.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod fallback;
mod manager;
mod models;
mod store;

use config::{Config, LogConfig};
use manager::ProxyManager;
use models::PoolConfig;
use store::{HealthStore, MemoryHealthStore, RedisHealthStore};

#[tokio::main]
async fn main() -> error::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log);

    info!("Starting Remuda Proxy Manager");

    // Bring up the health store. Redis failures downgrade to the
    // in-memory store rather than refusing to start.
    let redis = RedisHealthStore::new(&config.store.redis_url, config.store.op_timeout)?;
    let store: Arc<dyn HealthStore> = match redis.ping().await {
        Ok(()) => {
            info!("Connected to Redis at {}", config.store.redis_url);
            Arc::new(redis)
        }
        Err(e) => {
            warn!(
                "Redis unreachable ({}), continuing with in-memory health store",
                e
            );
            Arc::new(MemoryHealthStore::new())
        }
    };

    // Load pool definitions
    let raw = std::fs::read_to_string(&config.pools_file)?;
    let pools: Vec<PoolConfig> = serde_json::from_str(&raw)?;
    info!("Loaded {} pool definitions from {}", pools.len(), config.pools_file);

    // Initialize the manager (restores persisted metrics, starts the monitor)
    let manager = Arc::new(ProxyManager::new(store, config.manager.clone()));
    manager.initialize(pools).await?;

    // Periodically log a fleet health summary
    let (report_tx, mut report_shutdown) = watch::channel(false);
    let report_manager = manager.clone();
    let report_interval = config.manager.monitor_interval;
    let report_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(report_interval);
        ticker.tick().await; // Skip immediate tick
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = report_manager.health_report();
                    info!(
                        total = report.total,
                        active = report.active,
                        degraded = report.degraded,
                        blocked = report.blocked,
                        cooldown = report.cooldown,
                        "Fleet health"
                    );
                }
                _ = report_shutdown.changed() => {
                    if *report_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = report_tx.send(true);
    manager.shutdown().await;
    let _ = report_task.await;

    info!("Remuda Proxy Manager stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("remuda={}", log.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if log.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
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
}
