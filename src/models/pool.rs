use serde::{Deserialize, Serialize};
use url::Url;

use super::proxy::ProxyType;
use crate::error::{RemudaError, Result};

/// Geography code for proxies usable from anywhere
pub const GLOBAL_GEOGRAPHY: &str = "GLOBAL";

/// Strategy for picking a proxy out of a pool's eligible candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    RoundRobin,
    LeastUsed,
    #[default]
    Performance,
}

impl RotationStrategy {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "round_robin" | "roundrobin" | "round-robin" => Self::RoundRobin,
            "least_used" | "leastused" | "least-used" => Self::LeastUsed,
            _ => Self::Performance,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastUsed => "least_used",
            Self::Performance => "performance",
        }
    }
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `(type, geography)` identity of a pool
///
/// Geography codes are normalized to uppercase so `us`, `Us` and `US`
/// address the same pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub proxy_type: ProxyType,
    pub geography: String,
}

impl PoolKey {
    pub fn new(proxy_type: ProxyType, geography: &str) -> Self {
        let geography = geography.trim();
        let geography = if geography.is_empty() {
            GLOBAL_GEOGRAPHY.to_string()
        } else {
            geography.to_uppercase()
        };
        Self {
            proxy_type,
            geography,
        }
    }

    /// The GLOBAL pool for the same proxy type
    pub fn global(proxy_type: ProxyType) -> Self {
        Self::new(proxy_type, GLOBAL_GEOGRAPHY)
    }

    pub fn is_global(&self) -> bool {
        self.geography == GLOBAL_GEOGRAPHY
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.proxy_type, self.geography)
    }
}

/// Static provisioning entry for a single proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Stable identifier; defaults to `host:port` when omitted
    #[serde(default)]
    pub id: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Parse a proxy from a URL-ish string like `user:pass@1.2.3.4:8080`
    /// or `http://1.2.3.4:8080`.
    pub fn from_url(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RemudaError::InvalidConfig("empty proxy url".into()));
        }

        // Bare host:port (with optional credentials) has no scheme; borrow
        // one so the url crate will parse it.
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| RemudaError::InvalidConfig(format!("invalid proxy url {}: {}", raw, e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| {
                RemudaError::InvalidConfig(format!("proxy url {} has no host", raw))
            })?
            .to_string();
        let port = url
            .port()
            .ok_or_else(|| RemudaError::InvalidConfig(format!("proxy url {} has no port", raw)))?;

        let username = if url.username().is_empty() {
            None
        } else {
            Some(url.username().to_string())
        };
        let password = url.password().map(|p| p.to_string());

        Ok(Self {
            id: None,
            host,
            port,
            username,
            password,
        })
    }

    /// The identifier this entry registers under
    pub fn effective_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.host, self.port))
    }
}

/// Static provisioning entry for a whole pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub proxy_type: ProxyType,
    #[serde(default = "default_geography")]
    pub geography: String,
    #[serde(default)]
    pub strategy: RotationStrategy,
    pub proxies: Vec<ProxyConfig>,
}

fn default_geography() -> String {
    GLOBAL_GEOGRAPHY.to_string()
}

impl PoolConfig {
    pub fn key(&self) -> PoolKey {
        PoolKey::new(self.proxy_type, &self.geography)
    }
}
