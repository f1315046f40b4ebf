//! Proxy pool management
//!
//! The [`ProxyManager`] façade ties the pieces together: the catalog holds
//! the fleet, the selection engine picks from it, the session registry
//! pins crawl sessions to a backend, the health tracker folds usage
//! reports in, and the monitor sweeps cooldowns in the background. The
//! health store is shared state between manager processes; everything
//! keeps working from memory when it is down.

pub mod catalog;
pub mod health;
pub mod monitor;
pub mod selection;
pub mod session;

pub use catalog::{PoolEntry, ProxyCatalog};
pub use health::HealthTracker;
pub use monitor::{MonitorConfig, MonitorHandle, MonitorService};
pub use selection::SelectionFilter;
pub use session::SessionRegistry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RemudaError, Result};
use crate::models::{
    AcquireOptions, HealthReport, PoolConfig, PoolReport, Proxy, ProxyStatus, UsageStats,
    GLOBAL_GEOGRAPHY,
};
use crate::store::HealthStore;

/// Concurrent store reads during the initialization overlay
const MAX_CONCURRENT_LOADS: usize = 10;

/// Manager tuning knobs
///
/// Tunables are global rather than per-pool; pools differ only in their
/// selection strategy.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Cooldown applied by `mark_blocked` when the caller does not give one
    pub default_cooldown: Duration,
    /// Default success-rate floor for selection
    pub min_success_rate: f64,
    /// Default captcha-rate ceiling for selection
    pub max_captcha_rate: f64,
    /// Success-rate floor a rotation replacement must clear
    pub rotate_min_success_rate: f64,
    /// Captcha-rate ceiling a rotation replacement must stay under
    pub rotate_max_captcha_rate: f64,
    /// TTL for persisted proxy metrics
    pub metrics_ttl: Duration,
    /// TTL for session bindings
    pub session_ttl: Duration,
    /// Monitor sweep interval
    pub monitor_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_cooldown: Duration::from_secs(60 * 60),
            min_success_rate: 0.7,
            max_captcha_rate: 0.3,
            rotate_min_success_rate: 0.8,
            rotate_max_captcha_rate: 0.2,
            metrics_ttl: Duration::from_secs(30 * 24 * 3600),
            session_ttl: Duration::from_secs(7 * 24 * 3600),
            monitor_interval: Duration::from_secs(300),
        }
    }
}

struct MonitorTask {
    handle: MonitorHandle,
    task: JoinHandle<()>,
}

/// Shared proxy pool manager
pub struct ProxyManager {
    catalog: Arc<ProxyCatalog>,
    sessions: Arc<SessionRegistry>,
    health: HealthTracker,
    store: Arc<dyn HealthStore>,
    config: ManagerConfig,
    initialized: AtomicBool,
    monitor: Mutex<Option<MonitorTask>>,
}

impl ProxyManager {
    /// Construct a manager over the given store. Pools are empty until
    /// [`ProxyManager::initialize`] runs.
    pub fn new(store: Arc<dyn HealthStore>, config: ManagerConfig) -> Self {
        let catalog = Arc::new(ProxyCatalog::new());
        let sessions = Arc::new(SessionRegistry::new(store.clone(), config.session_ttl));
        let health = HealthTracker::new(catalog.clone(), store.clone(), config.metrics_ttl);

        Self {
            catalog,
            sessions,
            health,
            store,
            config,
            initialized: AtomicBool::new(false),
            monitor: Mutex::new(None),
        }
    }

    /// Register the configured pools, overlay persisted metrics, and start
    /// the background monitor.
    pub async fn initialize(&self, pools: Vec<PoolConfig>) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(RemudaError::AlreadyInitialized);
        }

        if let Err(e) = self.catalog.register_pools(&pools) {
            self.initialized.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.restore_metrics().await;
        self.spawn_monitor();

        info!(
            "Proxy manager initialized ({} pools, {} proxies)",
            pools.len(),
            self.catalog.len()
        );
        Ok(())
    }

    /// Overlay metrics persisted by earlier runs or sibling processes onto
    /// the freshly registered catalog.
    async fn restore_metrics(&self) {
        let loaded: Vec<_> = futures::stream::iter(self.catalog.ids())
            .map(|id| {
                let store = self.store.clone();
                async move {
                    let metrics = health::load_metrics(store.as_ref(), &id).await;
                    (id, metrics)
                }
            })
            .buffer_unordered(MAX_CONCURRENT_LOADS)
            .collect()
            .await;

        let now = Utc::now();
        let mut restored = 0usize;
        for (id, metrics) in loaded {
            let Some(metrics) = metrics else { continue };
            self.catalog.update(&id, |proxy| {
                proxy.metrics = metrics;
                proxy.recompute_status(now);
            });
            restored += 1;
        }

        if restored > 0 {
            info!(count = restored, "Restored persisted proxy metrics");
        }
    }

    fn spawn_monitor(&self) {
        let (handle, shutdown_rx) = MonitorHandle::new();
        let service = MonitorService::new(
            self.catalog.clone(),
            self.sessions.clone(),
            self.store.clone(),
            MonitorConfig {
                sweep_interval: self.config.monitor_interval,
                metrics_ttl: self.config.metrics_ttl,
            },
        );
        let task = tokio::spawn(async move { service.run(shutdown_rx).await });
        *self.monitor.lock() = Some(MonitorTask { handle, task });
    }

    /// Hand out a proxy matching the given criteria.
    ///
    /// A live session binding to an active proxy short-circuits selection;
    /// anything else goes through pool resolution, the eligibility filter,
    /// and the pool's strategy. On success with a session id the binding
    /// is created or refreshed.
    pub async fn acquire_proxy(&self, options: &AcquireOptions) -> Result<Proxy> {
        self.ensure_initialized()?;
        let now = Utc::now();

        if let Some(session_id) = options.session_id.as_deref() {
            if let Some(proxy_id) = self.sessions.lookup(session_id).await {
                match self.catalog.get(&proxy_id) {
                    Some(proxy) if proxy.status == ProxyStatus::Active => {
                        if !options.exclude.iter().any(|id| id == &proxy.id) {
                            debug!("Session {} sticking to proxy {}", session_id, proxy.id);
                            return Ok(proxy);
                        }
                        // Excluded for this call only; a fresh selection
                        // below will rebind the session.
                    }
                    _ => {
                        debug!(
                            "Dropping binding of session {} to unusable proxy {}",
                            session_id, proxy_id
                        );
                        self.sessions.unbind(session_id).await;
                    }
                }
            }
        }

        let proxy_type = options.proxy_type.unwrap_or_default();
        let geography = options.geography.as_deref().unwrap_or(GLOBAL_GEOGRAPHY);
        let pool = selection::resolve_pool(&self.catalog, proxy_type, geography)?;

        let filter = SelectionFilter {
            exclude: options.exclude.clone(),
            min_success_rate: options
                .min_success_rate
                .unwrap_or(self.config.min_success_rate),
            max_captcha_rate: options
                .max_captcha_rate
                .unwrap_or(self.config.max_captcha_rate),
        };
        let proxy = selection::select(&self.catalog, &pool, &filter, now)?;

        if let Some(session_id) = options.session_id.as_deref() {
            self.sessions.bind(session_id, &proxy.id).await;
        }

        debug!("Acquired proxy {} from pool {}", proxy.id, pool.key);
        Ok(proxy)
    }

    /// Return a proxy after use.
    ///
    /// Pools are shared, so the proxy itself stays available throughout;
    /// the only effect is dropping the session binding when a session id
    /// is given.
    pub async fn release_proxy(&self, proxy_id: &str, session_id: Option<&str>) -> Result<()> {
        self.ensure_initialized()?;

        if let Some(session_id) = session_id {
            self.sessions.unbind(session_id).await;
        }
        debug!("Released proxy {}", proxy_id);
        Ok(())
    }

    /// Fold a batch usage report into the named proxy.
    ///
    /// Reports are observations: unknown ids are logged and dropped, and
    /// store failures never surface here.
    pub async fn report_usage(&self, proxy_id: &str, stats: &UsageStats) {
        if !self.is_initialized() {
            warn!("Usage report for {} before initialization dropped", proxy_id);
            return;
        }
        self.health.report_usage(proxy_id, stats).await;
    }

    /// Take a proxy out of rotation until the cooldown passes.
    pub async fn mark_blocked(&self, proxy_id: &str, cooldown: Option<Duration>) -> Result<Proxy> {
        self.ensure_initialized()?;
        let cooldown = cooldown.unwrap_or(self.config.default_cooldown);
        self.health.mark_blocked(proxy_id, cooldown).await
    }

    /// Check whether a proxy should be swapped out and pick a replacement
    /// when it should.
    ///
    /// `Ok(None)` means keep using it. The replacement comes from the same
    /// pool, excludes the proxy being replaced, and must clear the stricter
    /// rotation thresholds.
    pub async fn rotate_if_needed(&self, proxy_id: &str) -> Result<Option<Proxy>> {
        self.ensure_initialized()?;

        let id = self
            .catalog
            .resolve_id(proxy_id)
            .ok_or_else(|| RemudaError::UnknownProxy {
                id: proxy_id.to_string(),
            })?;
        let proxy = self
            .catalog
            .get(&id)
            .ok_or_else(|| RemudaError::UnknownProxy {
                id: proxy_id.to_string(),
            })?;

        let now = Utc::now();
        let needs_rotation = !proxy.is_selectable(now)
            || proxy.metrics.success_rate < self.config.min_success_rate
            || proxy.metrics.captcha_rate > self.config.max_captcha_rate;
        if !needs_rotation {
            return Ok(None);
        }

        let pool = selection::resolve_pool(&self.catalog, proxy.proxy_type, &proxy.geography)?;
        let filter = SelectionFilter {
            exclude: vec![proxy.id.clone()],
            min_success_rate: self.config.rotate_min_success_rate,
            max_captcha_rate: self.config.rotate_max_captcha_rate,
        };
        let replacement = selection::select(&self.catalog, &pool, &filter, now)?;

        info!(
            "Rotating proxy {} -> {} in pool {}",
            proxy.id, replacement.id, pool.key
        );
        Ok(Some(replacement))
    }

    /// Aggregate health snapshot, computed from memory only.
    pub fn health_report(&self) -> HealthReport {
        let now = Utc::now();
        let mut report = HealthReport::default();

        let mut pools = self.catalog.pools();
        pools.sort_by(|a, b| a.key.to_string().cmp(&b.key.to_string()));

        for entry in pools {
            let members = self.catalog.pool_members(&entry.key);
            let mut selectable = 0usize;
            let mut rate_sum = 0.0;

            for proxy in &members {
                report.total += 1;
                match proxy.status {
                    ProxyStatus::Active => report.active += 1,
                    ProxyStatus::Degraded => report.degraded += 1,
                    ProxyStatus::Blocked => report.blocked += 1,
                    ProxyStatus::Cooldown => report.cooldown += 1,
                }
                if proxy.is_selectable(now) {
                    selectable += 1;
                }
                rate_sum += proxy.metrics.success_rate;
            }

            let avg_success_rate = if members.is_empty() {
                0.0
            } else {
                rate_sum / members.len() as f64
            };
            report.pools.push(PoolReport {
                pool: entry.key.to_string(),
                strategy: entry.strategy,
                total: members.len(),
                selectable,
                avg_success_rate,
            });
        }

        report
    }

    /// Stop the background monitor. Safe to call more than once.
    pub async fn shutdown(&self) {
        let task = self.monitor.lock().take();
        if let Some(MonitorTask { handle, task }) = task {
            handle.shutdown();
            if let Err(e) = task.await {
                warn!("Pool monitor task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(RemudaError::NotInitialized)
        }
    }
}

impl std::fmt::Debug for ProxyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyManager")
            .field("initialized", &self.is_initialized())
            .field("proxies", &self.catalog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProxyConfig, ProxyMetrics, ProxyType, RotationStrategy};
    use crate::store::{proxy_key, MemoryHealthStore};

    fn pool_config(
        proxy_type: ProxyType,
        geography: &str,
        strategy: RotationStrategy,
        ids: &[&str],
    ) -> PoolConfig {
        PoolConfig {
            proxy_type,
            geography: geography.to_string(),
            strategy,
            proxies: ids
                .iter()
                .enumerate()
                .map(|(index, id)| ProxyConfig {
                    id: Some(id.to_string()),
                    host: format!("10.0.0.{}", index + 1),
                    port: 8080,
                    username: None,
                    password: None,
                })
                .collect(),
        }
    }

    fn manager_over(store: Arc<dyn HealthStore>) -> ProxyManager {
        ProxyManager::new(store, ManagerConfig::default())
    }

    async fn residential_us(ids: &[&str]) -> ProxyManager {
        let manager = manager_over(Arc::new(MemoryHealthStore::new()));
        manager
            .initialize(vec![pool_config(
                ProxyType::Residential,
                "US",
                RotationStrategy::LeastUsed,
                ids,
            )])
            .await
            .unwrap();
        manager
    }

    /// Store double whose every operation fails.
    struct UnavailableStore;

    #[async_trait::async_trait]
    impl HealthStore for UnavailableStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(RemudaError::StoreUnavailable("down".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(RemudaError::StoreUnavailable("down".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(RemudaError::StoreUnavailable("down".to_string()))
        }
        async fn ping(&self) -> Result<()> {
            Err(RemudaError::StoreUnavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_lifecycle_guards() {
        let manager = manager_over(Arc::new(MemoryHealthStore::new()));

        let err = manager
            .acquire_proxy(&AcquireOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemudaError::NotInitialized));

        manager
            .initialize(vec![pool_config(
                ProxyType::Residential,
                "US",
                RotationStrategy::Performance,
                &["p1"],
            )])
            .await
            .unwrap();

        let err = manager.initialize(vec![]).await.unwrap_err();
        assert!(matches!(err, RemudaError::AlreadyInitialized));

        manager.shutdown().await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_initialize_rejects_bad_config_and_recovers() {
        let manager = manager_over(Arc::new(MemoryHealthStore::new()));

        let duplicate = vec![
            pool_config(ProxyType::Residential, "US", RotationStrategy::Performance, &["p1"]),
            pool_config(ProxyType::Datacenter, "US", RotationStrategy::Performance, &["p1"]),
        ];
        let err = manager.initialize(duplicate).await.unwrap_err();
        assert!(matches!(err, RemudaError::InvalidConfig(_)));
        assert!(!manager.is_initialized());

        // A corrected config goes through on the next attempt.
        manager
            .initialize(vec![pool_config(
                ProxyType::Residential,
                "US",
                RotationStrategy::Performance,
                &["p1"],
            )])
            .await
            .unwrap();
        assert!(manager.is_initialized());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_initialize_restores_persisted_metrics() {
        let store = Arc::new(MemoryHealthStore::new());
        let persisted = ProxyMetrics {
            success_rate: 0.2,
            total_requests: 50,
            failed_requests: 40,
            ..ProxyMetrics::default()
        };
        store
            .set(
                &proxy_key("p1"),
                &serde_json::to_string(&persisted).unwrap(),
                Duration::from_secs(3600),
            )
            .await
            .unwrap();

        let manager = manager_over(store);
        manager
            .initialize(vec![pool_config(
                ProxyType::Residential,
                "US",
                RotationStrategy::Performance,
                &["p1", "p2"],
            )])
            .await
            .unwrap();

        // p1 came back with its poor history and the status to match.
        let report = manager.health_report();
        assert_eq!(report.total, 2);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.active, 1);

        let acquired = manager
            .acquire_proxy(&AcquireOptions::for_pool(ProxyType::Residential, "US"))
            .await
            .unwrap();
        assert_eq!(acquired.id, "p2");
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_acquire_geography_fallback() {
        let manager = manager_over(Arc::new(MemoryHealthStore::new()));
        manager
            .initialize(vec![pool_config(
                ProxyType::Residential,
                "",
                RotationStrategy::Performance,
                &["g1"],
            )])
            .await
            .unwrap();

        let proxy = manager
            .acquire_proxy(&AcquireOptions::for_pool(ProxyType::Residential, "FR"))
            .await
            .unwrap();
        assert_eq!(proxy.id, "g1");
        assert_eq!(proxy.geography, "GLOBAL");

        // No pool of that type at all: type mismatch is not bridged.
        let err = manager
            .acquire_proxy(&AcquireOptions::for_pool(ProxyType::Mobile, "FR"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemudaError::NoSuitablePool { .. }));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_acquire_defaults_to_residential_global() {
        let manager = manager_over(Arc::new(MemoryHealthStore::new()));
        manager
            .initialize(vec![pool_config(
                ProxyType::Residential,
                "",
                RotationStrategy::Performance,
                &["g1"],
            )])
            .await
            .unwrap();

        let proxy = manager
            .acquire_proxy(&AcquireOptions::default())
            .await
            .unwrap();
        assert_eq!(proxy.id, "g1");
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_session_affinity_and_rebind() {
        let manager = residential_us(&["p1", "p2"]).await;
        let options =
            AcquireOptions::for_pool(ProxyType::Residential, "US").with_session("crawl-1");

        let first = manager.acquire_proxy(&options).await.unwrap();

        // Push traffic through the bound proxy; least-used would now prefer
        // the other one, but the binding wins.
        manager
            .report_usage(
                &first.id,
                &UsageStats {
                    request_count: 10,
                    success_count: 10,
                    ..UsageStats::default()
                },
            )
            .await;
        let second = manager.acquire_proxy(&options).await.unwrap();
        assert_eq!(second.id, first.id);

        // Blocking the bound proxy invalidates the binding.
        manager.mark_blocked(&first.id, None).await.unwrap();
        let third = manager.acquire_proxy(&options).await.unwrap();
        assert_ne!(third.id, first.id);

        // And the session now sticks to the replacement.
        let fourth = manager.acquire_proxy(&options).await.unwrap();
        assert_eq!(fourth.id, third.id);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_degraded_proxy_loses_its_sessions() {
        let manager = residential_us(&["p1", "p2"]).await;
        let options =
            AcquireOptions::for_pool(ProxyType::Residential, "US").with_session("crawl-1");

        let bound = manager.acquire_proxy(&options).await.unwrap();
        assert_eq!(bound.id, "p1");

        manager
            .report_usage(
                "p1",
                &UsageStats {
                    request_count: 20,
                    success_count: 10,
                    failure_count: 10,
                    ..UsageStats::default()
                },
            )
            .await;

        // The bound proxy slid to degraded, so the binding moves on.
        let next = manager.acquire_proxy(&options).await.unwrap();
        assert_eq!(next.id, "p2");
        let sticky = manager.acquire_proxy(&options).await.unwrap();
        assert_eq!(sticky.id, "p2");
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_release_clears_binding() {
        let manager = residential_us(&["p1", "p2"]).await;
        let options =
            AcquireOptions::for_pool(ProxyType::Residential, "US").with_session("crawl-1");

        let bound = manager.acquire_proxy(&options).await.unwrap();
        assert_eq!(bound.id, "p1");
        manager
            .report_usage(
                "p1",
                &UsageStats {
                    request_count: 10,
                    success_count: 10,
                    ..UsageStats::default()
                },
            )
            .await;

        manager.release_proxy("p1", Some("crawl-1")).await.unwrap();

        // With the binding gone, least-used picks the idle proxy.
        let next = manager.acquire_proxy(&options).await.unwrap();
        assert_eq!(next.id, "p2");
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_collapsing_success_rate_empties_the_pool() {
        let manager = residential_us(&["p1"]).await;

        let acquired = manager
            .acquire_proxy(&AcquireOptions::for_pool(ProxyType::Residential, "US"))
            .await
            .unwrap();
        assert_eq!(acquired.id, "p1");

        manager
            .report_usage(
                "p1",
                &UsageStats {
                    request_count: 20,
                    success_count: 5,
                    failure_count: 15,
                    avg_response_time_ms: 500.0,
                    ..UsageStats::default()
                },
            )
            .await;

        // 5 of 20 succeeded: past the blocking threshold.
        let report = manager.health_report();
        assert_eq!(report.blocked, 1);

        let err = manager
            .acquire_proxy(&AcquireOptions::for_pool(ProxyType::Residential, "US"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemudaError::NoAvailableProxy { .. }));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_acquire_respects_exclusions() {
        let manager = residential_us(&["p1"]).await;

        let options = AcquireOptions {
            proxy_type: Some(ProxyType::Residential),
            geography: Some("US".to_string()),
            exclude: vec!["p1".to_string()],
            ..AcquireOptions::default()
        };
        let err = manager.acquire_proxy(&options).await.unwrap_err();
        assert!(matches!(err, RemudaError::NoAvailableProxy { .. }));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_mark_blocked_uses_default_cooldown() {
        let manager = residential_us(&["p1"]).await;

        let proxy = manager.mark_blocked("p1", None).await.unwrap();
        let until = proxy.metrics.cooldown_until.unwrap();
        assert!(until > Utc::now() + chrono::Duration::minutes(59));
        assert!(until < Utc::now() + chrono::Duration::minutes(61));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_rotate_if_needed() {
        let manager = residential_us(&["p1", "p2", "p3"]).await;

        // Healthy proxy: nothing to do.
        assert!(manager.rotate_if_needed("p1").await.unwrap().is_none());

        // Unknown proxy: a command error.
        let err = manager.rotate_if_needed("nobody").await.unwrap_err();
        assert!(matches!(err, RemudaError::UnknownProxy { .. }));

        // p2 is decent but misses the stricter replacement bar.
        manager
            .report_usage(
                "p2",
                &UsageStats {
                    request_count: 20,
                    success_count: 15,
                    failure_count: 5,
                    ..UsageStats::default()
                },
            )
            .await;

        manager.mark_blocked("p1", None).await.unwrap();
        let replacement = manager.rotate_if_needed("p1").await.unwrap().unwrap();
        assert_eq!(replacement.id, "p3");
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_rotate_exhausted_pool() {
        let manager = residential_us(&["p1"]).await;

        manager.mark_blocked("p1", None).await.unwrap();
        let err = manager.rotate_if_needed("p1").await.unwrap_err();
        assert!(matches!(err, RemudaError::NoAvailableProxy { .. }));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_report_aggregates() {
        let manager = residential_us(&["p1", "p2", "p3"]).await;

        manager.mark_blocked("p3", None).await.unwrap();
        manager
            .report_usage(
                "p2",
                &UsageStats {
                    request_count: 10,
                    success_count: 5,
                    failure_count: 5,
                    ..UsageStats::default()
                },
            )
            .await;

        let report = manager.health_report();
        assert_eq!(report.total, 3);
        assert_eq!(report.active, 1);
        assert_eq!(report.degraded, 1);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.pools.len(), 1);
        assert_eq!(report.pools[0].pool, "residential-US");
        assert_eq!(report.pools[0].selectable, 2);
        assert!((report.selectable_ratio() - 2.0 / 3.0).abs() < 1e-9);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_store_outage_is_contained() {
        let manager = manager_over(Arc::new(UnavailableStore));
        manager
            .initialize(vec![pool_config(
                ProxyType::Residential,
                "US",
                RotationStrategy::Performance,
                &["p1", "p2"],
            )])
            .await
            .unwrap();

        let options =
            AcquireOptions::for_pool(ProxyType::Residential, "US").with_session("crawl-1");
        let proxy = manager.acquire_proxy(&options).await.unwrap();

        manager
            .report_usage(
                &proxy.id,
                &UsageStats {
                    request_count: 10,
                    success_count: 9,
                    failure_count: 1,
                    ..UsageStats::default()
                },
            )
            .await;

        // Memory kept the update even though every store call failed.
        let report = manager.health_report();
        assert_eq!(report.total, 2);
        assert!(report
            .pools
            .iter()
            .any(|pool| pool.avg_success_rate < 1.0));

        // Affinity still works process-locally.
        let again = manager.acquire_proxy(&options).await.unwrap();
        assert_eq!(again.id, proxy.id);

        manager.mark_blocked(&proxy.id, None).await.unwrap();
        manager.release_proxy(&proxy.id, Some("crawl-1")).await.unwrap();
        manager.shutdown().await;
    }
}
