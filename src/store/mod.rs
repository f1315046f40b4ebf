pub mod memory;
pub mod redis;

pub use memory::MemoryHealthStore;
pub use redis::RedisHealthStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Key prefix for all entries written by this service.
const KEY_PREFIX: &str = "remuda";

/// Shared persistence for proxy metrics and session bindings.
///
/// Implementations must be safe to call concurrently. Values are opaque
/// JSON strings; the store never inspects them. Every write carries its
/// own TTL so stale entries age out without a reaper.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Fetch a value, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value with a per-key TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Liveness probe against the backing store.
    async fn ping(&self) -> Result<()>;
}

/// Key for a proxy's persisted metrics.
pub fn proxy_key(proxy_id: &str) -> String {
    format!("{}:proxy:{}", KEY_PREFIX, proxy_id)
}

/// Key for a session binding.
pub fn session_key(session_id: &str) -> String {
    format!("{}:session:{}", KEY_PREFIX, session_id)
}
