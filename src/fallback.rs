//! Secondary proxy source contract
//!
//! When every pool a caller can reach is exhausted, the caller may go to
//! an external source for a temporary proxy. The manager stays out of
//! that path on purpose: it hands out `NoAvailableProxy`, the caller asks
//! a provider, and usage keeps flowing through the manager, which
//! attributes any endpoint it recognizes via the `host:port` index.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ProxyType, UsageStats};

/// A proxy offered by a fallback source, outside the managed pools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackCandidate {
    /// Connection string, credentials embedded when the source has them
    pub url: String,
    pub proxy_type: ProxyType,
    pub host: String,
    pub port: u16,
}

impl FallbackCandidate {
    /// Wire endpoint as `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A secondary source of proxies for when the managed pools run dry
#[async_trait]
pub trait FallbackProvider: Send + Sync {
    /// Fetch candidates matching the given criteria
    async fn fetch_candidates(
        &self,
        proxy_type: ProxyType,
        geography: &str,
    ) -> Result<Vec<FallbackCandidate>>;

    /// Usage sink for candidates this provider handed out
    async fn report_usage(&self, endpoint: &str, stats: &UsageStats);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        candidates: Vec<FallbackCandidate>,
    }

    #[async_trait]
    impl FallbackProvider for StaticProvider {
        async fn fetch_candidates(
            &self,
            proxy_type: ProxyType,
            _geography: &str,
        ) -> Result<Vec<FallbackCandidate>> {
            Ok(self
                .candidates
                .iter()
                .filter(|candidate| candidate.proxy_type == proxy_type)
                .cloned()
                .collect())
        }

        async fn report_usage(&self, _endpoint: &str, _stats: &UsageStats) {}
    }

    #[tokio::test]
    async fn test_provider_is_object_safe() {
        let provider: Box<dyn FallbackProvider> = Box::new(StaticProvider {
            candidates: vec![FallbackCandidate {
                url: "http://7.7.7.7:3128".to_string(),
                proxy_type: ProxyType::Datacenter,
                host: "7.7.7.7".to_string(),
                port: 3128,
            }],
        });

        let found = provider
            .fetch_candidates(ProxyType::Datacenter, "US")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].endpoint(), "7.7.7.7:3128");

        let none = provider
            .fetch_candidates(ProxyType::Mobile, "US")
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
