use std::collections::HashSet;

use dashmap::DashMap;

use crate::error::{RemudaError, Result};
use crate::models::{PoolConfig, PoolKey, Proxy, ProxyMetrics, ProxyStatus, RotationStrategy};

/// One registered pool: its selection strategy plus member ids in
/// registration order.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub key: PoolKey,
    pub strategy: RotationStrategy,
    pub members: Vec<String>,
}

/// The in-memory proxy inventory.
///
/// Populated once at initialization and never shrinks at runtime; health
/// mutations go through [`ProxyCatalog::update`] so each record is only
/// ever touched under its own entry lock. The endpoint index maps
/// `host:port` back to a registered id so usage reported against a raw
/// endpoint (e.g. one handed out by a fallback source that happens to be
/// in the catalog) still lands on the right record.
#[derive(Debug, Default)]
pub struct ProxyCatalog {
    pools: DashMap<PoolKey, PoolEntry>,
    proxies: DashMap<String, Proxy>,
    endpoints: DashMap<String, String>,
}

impl ProxyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every pool from the provisioning config.
    ///
    /// Validates the whole set before touching any table, so a rejected
    /// config leaves the catalog unchanged. Proxy ids must be unique
    /// across all pools and each `(type, geography)` pool may appear only
    /// once.
    pub fn register_pools(&self, configs: &[PoolConfig]) -> Result<()> {
        let mut seen_ids = HashSet::new();
        let mut seen_keys = HashSet::new();

        for config in configs {
            let key = config.key();
            if !seen_keys.insert(key.clone()) || self.pools.contains_key(&key) {
                return Err(RemudaError::InvalidConfig(format!(
                    "pool {} is declared more than once",
                    key
                )));
            }
            for proxy_config in &config.proxies {
                let id = proxy_config.effective_id();
                if !seen_ids.insert(id.clone()) || self.proxies.contains_key(&id) {
                    return Err(RemudaError::InvalidConfig(format!(
                        "duplicate proxy id {}",
                        id
                    )));
                }
            }
        }

        for config in configs {
            self.insert_pool(config);
        }
        Ok(())
    }

    fn insert_pool(&self, config: &PoolConfig) {
        let key = config.key();
        let mut members = Vec::with_capacity(config.proxies.len());

        for proxy_config in &config.proxies {
            let id = proxy_config.effective_id();
            let proxy = Proxy {
                id: id.clone(),
                host: proxy_config.host.clone(),
                port: proxy_config.port,
                username: proxy_config.username.clone(),
                password: proxy_config.password.clone(),
                proxy_type: key.proxy_type,
                geography: key.geography.clone(),
                status: ProxyStatus::Active,
                metrics: ProxyMetrics::default(),
            };

            // First registration wins when two entries share an endpoint.
            self.endpoints
                .entry(proxy.endpoint())
                .or_insert_with(|| id.clone());
            self.proxies.insert(id.clone(), proxy);
            members.push(id);
        }

        self.pools.insert(
            key.clone(),
            PoolEntry {
                key,
                strategy: config.strategy,
                members,
            },
        );
    }

    /// Snapshot of one proxy record
    pub fn get(&self, id: &str) -> Option<Proxy> {
        self.proxies.get(id).map(|p| p.clone())
    }

    /// Mutate one proxy record under its entry lock and return the updated
    /// snapshot.
    ///
    /// The closure runs while the record's shard is locked: it must not
    /// call back into the catalog.
    pub fn update<F>(&self, id: &str, f: F) -> Option<Proxy>
    where
        F: FnOnce(&mut Proxy),
    {
        self.proxies.get_mut(id).map(|mut entry| {
            f(&mut entry);
            entry.clone()
        })
    }

    /// Map a reported id to a registered one: either the id itself or, for
    /// raw `host:port` endpoints, the id registered for that endpoint.
    pub fn resolve_id(&self, id_or_endpoint: &str) -> Option<String> {
        if self.proxies.contains_key(id_or_endpoint) {
            return Some(id_or_endpoint.to_string());
        }
        self.endpoints
            .get(id_or_endpoint)
            .map(|id| id.clone())
    }

    pub fn pool(&self, key: &PoolKey) -> Option<PoolEntry> {
        self.pools.get(key).map(|entry| entry.clone())
    }

    /// Member snapshots in registration order
    pub fn pool_members(&self, key: &PoolKey) -> Vec<Proxy> {
        let Some(entry) = self.pools.get(key) else {
            return Vec::new();
        };
        entry
            .members
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn pools(&self) -> Vec<PoolEntry> {
        self.pools.iter().map(|entry| entry.clone()).collect()
    }

    /// All registered proxy ids
    pub fn ids(&self) -> Vec<String> {
        self.proxies.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}
