//! Usage ingestion and health bookkeeping
//!
//! Usage reports are observations, not commands: a report against an id
//! nobody registered is logged and dropped, never an error back to the
//! caller. `mark_blocked` is the one command here and does fail on an
//! unknown id.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{RemudaError, Result};
use crate::manager::catalog::ProxyCatalog;
use crate::models::{Proxy, ProxyMetrics, ProxyStatus, UsageStats};
use crate::store::{proxy_key, HealthStore};

/// Read a proxy's persisted metrics block, if the store has one.
///
/// Both store misses and parse failures degrade to `None`; the caller
/// keeps working from its in-memory copy.
pub(crate) async fn load_metrics(store: &dyn HealthStore, proxy_id: &str) -> Option<ProxyMetrics> {
    match store.get(&proxy_key(proxy_id)).await {
        Ok(Some(json)) => match serde_json::from_str(&json) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!("Discarding unreadable stored metrics for {}: {}", proxy_id, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            debug!("Metrics read for {} skipped store: {}", proxy_id, e);
            None
        }
    }
}

/// Persist a proxy's metrics block, warning instead of failing.
pub(crate) async fn persist_metrics(store: &dyn HealthStore, proxy: &Proxy, ttl: Duration) {
    let json = match serde_json::to_string(&proxy.metrics) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode metrics for {}: {}", proxy.id, e);
            return;
        }
    };

    if let Err(e) = store.set(&proxy_key(&proxy.id), &json, ttl).await {
        warn!("Failed to persist metrics for {}: {}", proxy.id, e);
    }
}

/// Applies usage reports and blocking commands to catalog records and
/// mirrors the results to the health store.
pub struct HealthTracker {
    catalog: Arc<ProxyCatalog>,
    store: Arc<dyn HealthStore>,
    metrics_ttl: Duration,
}

impl HealthTracker {
    pub fn new(
        catalog: Arc<ProxyCatalog>,
        store: Arc<dyn HealthStore>,
        metrics_ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            store,
            metrics_ttl,
        }
    }

    /// Fold a batch usage report into the proxy it names.
    ///
    /// The id may be a registered id or a bare `host:port` endpoint. The
    /// persisted metrics are re-read first so updates from sibling
    /// processes are not overwritten wholesale; the read-modify-write is
    /// still last-write-wins, and concurrent reporters can lose a batch
    /// to each other. Health signals self-correct over many samples.
    pub async fn report_usage(&self, proxy_id: &str, stats: &UsageStats) {
        let Some(id) = self.catalog.resolve_id(proxy_id) else {
            warn!("Usage report for unknown proxy {} dropped", proxy_id);
            return;
        };

        let stored = load_metrics(self.store.as_ref(), &id).await;
        let now = Utc::now();

        let mut transition: Option<(ProxyStatus, ProxyStatus)> = None;
        let updated = self.catalog.update(&id, |proxy| {
            if let Some(metrics) = stored {
                proxy.metrics = metrics;
            }
            let previous = proxy.status;
            proxy.metrics.apply_usage(stats, now);
            proxy.recompute_status(now);
            if proxy.status != previous {
                transition = Some((previous, proxy.status));
            }
        });

        let Some(proxy) = updated else {
            // Registered a moment ago by resolve_id, so only reachable if
            // the catalog and index ever disagree.
            warn!("Usage report for unresolvable proxy {} dropped", proxy_id);
            return;
        };

        if let Some((from, to)) = transition {
            info!(
                "Proxy {} in pool {} transitioned {} -> {}",
                proxy.id,
                proxy.pool_key(),
                from,
                to
            );
        }

        persist_metrics(self.store.as_ref(), &proxy, self.metrics_ttl).await;
    }

    /// Force a proxy out of rotation until the cooldown passes.
    pub async fn mark_blocked(&self, proxy_id: &str, cooldown: Duration) -> Result<Proxy> {
        let id = self
            .catalog
            .resolve_id(proxy_id)
            .ok_or_else(|| RemudaError::UnknownProxy {
                id: proxy_id.to_string(),
            })?;

        let cooldown = chrono::Duration::from_std(cooldown)
            .map_err(|_| RemudaError::InvalidConfig("cooldown out of range".to_string()))?;
        let now = Utc::now();

        let updated = self
            .catalog
            .update(&id, |proxy| {
                proxy.status = ProxyStatus::Blocked;
                proxy.metrics.blocked_at = Some(now);
                proxy.metrics.cooldown_until = Some(now + cooldown);
            })
            .ok_or_else(|| RemudaError::UnknownProxy {
                id: proxy_id.to_string(),
            })?;

        info!(
            "Proxy {} in pool {} blocked until {}",
            updated.id,
            updated.pool_key(),
            updated
                .metrics
                .cooldown_until
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()
        );

        persist_metrics(self.store.as_ref(), &updated, self.metrics_ttl).await;
        Ok(updated)
    }
}

impl std::fmt::Debug for HealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthTracker")
            .field("metrics_ttl", &self.metrics_ttl)
            .finish()
    }
}
