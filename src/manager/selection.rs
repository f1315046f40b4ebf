//! Pool resolution and candidate ranking
//!
//! Everything here is a pure read over catalog snapshots; selection state
//! lives in the proxy metrics themselves, so two processes ranking the
//! same pool agree without coordination.

use chrono::{DateTime, Utc};

use crate::error::{RemudaError, Result};
use crate::manager::catalog::{PoolEntry, ProxyCatalog};
use crate::models::{PoolKey, Proxy, ProxyType, RotationStrategy};

/// Floor for the response-time denominator in the performance score, so
/// proxies with little or no traffic do not rank as infinitely fast.
const SCORE_RT_FLOOR_MS: f64 = 1000.0;

/// Per-call candidate constraints
#[derive(Debug, Clone)]
pub struct SelectionFilter {
    /// Proxy ids that must not be returned
    pub exclude: Vec<String>,
    pub min_success_rate: f64,
    pub max_captcha_rate: f64,
}

impl Default for SelectionFilter {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            min_success_rate: 0.0,
            max_captcha_rate: 1.0,
        }
    }
}

/// Find the pool serving `(proxy_type, geography)`.
///
/// A missing geography-specific pool falls back to the GLOBAL pool of the
/// same type; only when neither exists does this fail.
pub fn resolve_pool(
    catalog: &ProxyCatalog,
    proxy_type: ProxyType,
    geography: &str,
) -> Result<PoolEntry> {
    let exact = PoolKey::new(proxy_type, geography);
    if let Some(entry) = catalog.pool(&exact) {
        return Ok(entry);
    }

    if !exact.is_global() {
        if let Some(entry) = catalog.pool(&PoolKey::global(proxy_type)) {
            return Ok(entry);
        }
    }

    Err(RemudaError::NoSuitablePool {
        proxy_type,
        geography: exact.geography,
    })
}

/// Check whether a proxy may serve this selection pass
pub fn eligible(proxy: &Proxy, filter: &SelectionFilter, now: DateTime<Utc>) -> bool {
    if filter.exclude.iter().any(|id| id == &proxy.id) {
        return false;
    }
    if !proxy.is_selectable(now) {
        return false;
    }
    proxy.metrics.success_rate >= filter.min_success_rate
        && proxy.metrics.captcha_rate <= filter.max_captcha_rate
}

/// Pick one proxy from the pool according to its strategy.
///
/// Ties keep the earliest candidate in registration order.
pub fn select(
    catalog: &ProxyCatalog,
    pool: &PoolEntry,
    filter: &SelectionFilter,
    now: DateTime<Utc>,
) -> Result<Proxy> {
    let candidates: Vec<Proxy> = catalog
        .pool_members(&pool.key)
        .into_iter()
        .filter(|proxy| eligible(proxy, filter, now))
        .collect();

    let chosen = match pool.strategy {
        RotationStrategy::RoundRobin => candidates.into_iter().next(),
        RotationStrategy::LeastUsed => {
            let mut min_requests = u64::MAX;
            let mut selected: Option<Proxy> = None;
            for proxy in candidates {
                if proxy.metrics.total_requests < min_requests {
                    min_requests = proxy.metrics.total_requests;
                    selected = Some(proxy);
                }
            }
            selected
        }
        RotationStrategy::Performance => {
            let mut best_score = f64::NEG_INFINITY;
            let mut selected: Option<Proxy> = None;
            for proxy in candidates {
                let score = performance_score(&proxy);
                if score > best_score {
                    best_score = score;
                    selected = Some(proxy);
                }
            }
            selected
        }
    };

    chosen.ok_or_else(|| RemudaError::NoAvailableProxy {
        pool: pool.key.to_string(),
    })
}

/// Quality score used by the performance strategy: reward success, punish
/// captchas, discount slow responders.
pub(crate) fn performance_score(proxy: &Proxy) -> f64 {
    let denominator = proxy.metrics.avg_response_time_ms.max(SCORE_RT_FLOOR_MS);
    proxy.metrics.success_rate * (1.0 - proxy.metrics.captcha_rate) / denominator
}
