use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::store::{session_key, HealthStore};

/// Session-to-proxy affinity table.
///
/// Bindings are advisory: the registry only answers "which proxy did this
/// session last get", and callers revalidate the proxy before honoring the
/// answer. Each binding is mirrored to the health store so sibling
/// processes see it; store failures degrade to process-local affinity
/// rather than failing the call.
pub struct SessionRegistry {
    store: Arc<dyn HealthStore>,
    ttl: Duration,
    bindings: DashMap<String, Binding>,
}

#[derive(Debug, Clone)]
struct Binding {
    proxy_id: String,
    bound_at: DateTime<Utc>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn HealthStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            bindings: DashMap::new(),
        }
    }

    /// Bind a session to a proxy, replacing any previous binding.
    pub async fn bind(&self, session_id: &str, proxy_id: &str) {
        self.bindings.insert(
            session_id.to_string(),
            Binding {
                proxy_id: proxy_id.to_string(),
                bound_at: Utc::now(),
            },
        );

        if let Err(e) = self
            .store
            .set(&session_key(session_id), proxy_id, self.ttl)
            .await
        {
            warn!("Failed to persist binding for session {}: {}", session_id, e);
        }
    }

    /// Resolve a session to its bound proxy id, if any.
    ///
    /// Memory is the fast path; on a miss the store is consulted and a hit
    /// is adopted locally so bindings created by sibling processes stick.
    pub async fn lookup(&self, session_id: &str) -> Option<String> {
        let now = Utc::now();

        if let Some(binding) = self.bindings.get(session_id) {
            if !self.expired(binding.bound_at, now) {
                return Some(binding.proxy_id.clone());
            }
        }
        self.bindings
            .remove_if(session_id, |_, binding| self.expired(binding.bound_at, now));

        match self.store.get(&session_key(session_id)).await {
            Ok(Some(proxy_id)) => {
                self.bindings.insert(
                    session_id.to_string(),
                    Binding {
                        proxy_id: proxy_id.clone(),
                        bound_at: now,
                    },
                );
                Some(proxy_id)
            }
            Ok(None) => None,
            Err(e) => {
                debug!("Session lookup for {} skipped store: {}", session_id, e);
                None
            }
        }
    }

    /// Drop a session's binding everywhere.
    pub async fn unbind(&self, session_id: &str) {
        self.bindings.remove(session_id);

        if let Err(e) = self.store.delete(&session_key(session_id)).await {
            warn!("Failed to delete binding for session {}: {}", session_id, e);
        }
    }

    /// Drop in-memory bindings older than the session TTL. The store
    /// expires its own copies. Returns the number pruned.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.bindings.len();
        self.bindings
            .retain(|_, binding| !self.expired(binding.bound_at, now));
        before - self.bindings.len()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn expired(&self, bound_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(bound_at).to_std() {
            Ok(age) => age >= self.ttl,
            // bound_at in the future only happens with a clock jump; keep it.
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("ttl", &self.ttl)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryHealthStore;
    use chrono::Duration as ChronoDuration;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(MemoryHealthStore::new()),
            Duration::from_secs(7 * 24 * 3600),
        )
    }

    #[tokio::test]
    async fn test_bind_then_lookup() {
        let sessions = registry();
        sessions.bind("crawl-1", "p1").await;

        assert_eq!(sessions.lookup("crawl-1").await.as_deref(), Some("p1"));
        assert_eq!(sessions.lookup("crawl-2").await, None);
    }

    #[tokio::test]
    async fn test_rebind_replaces_proxy() {
        let sessions = registry();
        sessions.bind("crawl-1", "p1").await;
        sessions.bind("crawl-1", "p2").await;

        assert_eq!(sessions.lookup("crawl-1").await.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_unbind_clears_memory_and_store() {
        let store = Arc::new(MemoryHealthStore::new());
        let sessions = SessionRegistry::new(store.clone(), Duration::from_secs(60));
        sessions.bind("crawl-1", "p1").await;

        sessions.unbind("crawl-1").await;

        assert_eq!(sessions.lookup("crawl-1").await, None);
        assert_eq!(store.get(&session_key("crawl-1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_adopts_store_binding() {
        let store = Arc::new(MemoryHealthStore::new());
        store
            .set(&session_key("crawl-1"), "p9", Duration::from_secs(60))
            .await
            .unwrap();

        // A registry with no local state, as after a restart.
        let sessions = SessionRegistry::new(store, Duration::from_secs(60));
        assert_eq!(sessions.lookup("crawl-1").await.as_deref(), Some("p9"));
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_prune_respects_ttl() {
        let sessions = SessionRegistry::new(
            Arc::new(MemoryHealthStore::new()),
            Duration::from_secs(3600),
        );
        sessions.bind("crawl-1", "p1").await;
        sessions.bind("crawl-2", "p2").await;

        // Half the TTL in: nothing to prune.
        assert_eq!(sessions.prune(Utc::now() + ChronoDuration::minutes(30)), 0);
        assert_eq!(sessions.len(), 2);

        // Past the TTL: everything goes.
        assert_eq!(sessions.prune(Utc::now() + ChronoDuration::hours(2)), 2);
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_expired_binding_not_served() {
        let sessions =
            SessionRegistry::new(Arc::new(MemoryHealthStore::new()), Duration::from_millis(10));
        sessions.bind("crawl-1", "p1").await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        // The memory copy has expired; the store copy expired with it.
        assert_eq!(sessions.lookup("crawl-1").await, None);
        assert_eq!(sessions.len(), 0);
    }
}
