//! Pool monitor service
//!
//! Periodically sweeps every proxy record: cooldowns that have run out are
//! reset to a clean trial, stale derived statuses are recomputed, and
//! expired session bindings are pruned. Changed records are mirrored to
//! the health store so sibling processes pick them up.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, instrument};

use crate::manager::catalog::ProxyCatalog;
use crate::manager::health::persist_metrics;
use crate::manager::session::SessionRegistry;
use crate::models::{Proxy, ProxyStatus};
use crate::store::HealthStore;

/// Concurrent store writes per sweep
const MAX_CONCURRENT_FLUSHES: usize = 10;

/// Pool monitor configuration
#[derive(Clone)]
pub struct MonitorConfig {
    /// How often to sweep the catalog
    pub sweep_interval: Duration,
    /// TTL applied when persisting swept metrics
    pub metrics_ttl: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(300),
            metrics_ttl: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

/// Pool monitor service
pub struct MonitorService {
    catalog: Arc<ProxyCatalog>,
    sessions: Arc<SessionRegistry>,
    store: Arc<dyn HealthStore>,
    config: MonitorConfig,
}

impl MonitorService {
    pub fn new(
        catalog: Arc<ProxyCatalog>,
        sessions: Arc<SessionRegistry>,
        store: Arc<dyn HealthStore>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            catalog,
            sessions,
            store,
            config,
        }
    }

    /// Run the pool monitor
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting pool monitor (interval: {}s)",
            self.config.sweep_interval.as_secs()
        );

        // Initial sweep on startup so persisted cooldowns recover without
        // waiting a full interval.
        self.sweep().await;

        let mut ticker = interval(self.config.sweep_interval);
        ticker.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Pool monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass over every proxy record.
    #[instrument(skip(self))]
    pub(crate) async fn sweep(&self) {
        let now = Utc::now();
        let mut changed: Vec<Proxy> = Vec::new();
        let mut reclaimed = 0usize;

        for id in self.catalog.ids() {
            let mut dirty = false;
            let mut transition: Option<(ProxyStatus, ProxyStatus)> = None;

            let updated = self.catalog.update(&id, |proxy| {
                let cooldown_over = proxy.metrics.cooldown_until.is_some()
                    && !proxy.metrics.in_cooldown(now);

                if cooldown_over {
                    // Cooldown has run out: clean trial.
                    proxy.metrics.reset_for_trial();
                    proxy.status = ProxyStatus::Active;
                    dirty = true;
                } else {
                    let previous = proxy.status;
                    proxy.recompute_status(now);
                    if proxy.status != previous {
                        transition = Some((previous, proxy.status));
                        dirty = true;
                    }
                }
            });

            let Some(proxy) = updated else { continue };

            if let Some((from, to)) = transition {
                info!(
                    "Proxy {} in pool {} transitioned {} -> {}",
                    proxy.id,
                    proxy.pool_key(),
                    from,
                    to
                );
            } else if dirty {
                info!(
                    "Proxy {} in pool {} returned to rotation after cooldown",
                    proxy.id,
                    proxy.pool_key()
                );
                reclaimed += 1;
            }

            if dirty {
                changed.push(proxy);
            }
        }

        futures::stream::iter(changed)
            .map(|proxy| {
                let store = self.store.clone();
                let ttl = self.config.metrics_ttl;
                async move {
                    persist_metrics(store.as_ref(), &proxy, ttl).await;
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FLUSHES)
            .collect::<Vec<()>>()
            .await;

        if reclaimed > 0 {
            info!(count = reclaimed, "Reclaimed proxies from cooldown");
        }

        let pruned = self.sessions.prune(now);
        if pruned > 0 {
            info!(count = pruned, "Pruned expired session bindings");
        }
    }
}

/// Handle for managing the pool monitor
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl MonitorHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for MonitorHandle {
    fn default() -> Self {
        Self::new().0
    }
}
