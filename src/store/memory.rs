use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::Result;
use crate::store::HealthStore;

/// In-process [`HealthStore`] used when Redis is not configured or not
/// reachable, and as the store double in tests.
///
/// TTLs are honored lazily: expired entries are dropped when read, so a
/// process that never touches a key simply keeps it until shutdown. State
/// does not survive a restart or reach other instances.
#[derive(Debug, Default)]
pub struct MemoryHealthStore {
    entries: DashMap<String, Entry>,
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl MemoryHealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, counting entries that expired but were not
    /// read since.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl HealthStore for MemoryHealthStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let live = self.entries.get(key).and_then(|entry| {
            if Instant::now() < entry.expires_at {
                Some(entry.value.clone())
            } else {
                None
            }
        });

        if live.is_none() {
            self.entries
                .remove_if(key, |_, entry| Instant::now() >= entry.expires_at);
        }

        Ok(live)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryHealthStore::new();
        store
            .set("remuda:proxy:p1", "{}", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            store.get("remuda:proxy:p1").await.unwrap(),
            Some("{}".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = MemoryHealthStore::new();
        assert_eq!(store.get("remuda:proxy:absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_dropped_on_read() {
        let store = MemoryHealthStore::new();
        store
            .set("remuda:session:s1", "p1", Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("remuda:session:s1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_ttl() {
        let store = MemoryHealthStore::new();
        store
            .set("k", "old", Duration::from_millis(10))
            .await
            .unwrap();
        store.set("k", "new", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryHealthStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ping_always_succeeds() {
        let store = MemoryHealthStore::new();
        assert!(store.ping().await.is_ok());
    }
}
