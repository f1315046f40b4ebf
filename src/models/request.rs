use serde::{Deserialize, Serialize};

use super::proxy::ProxyType;

/// Criteria for acquiring a proxy
///
/// All fields are optional; absent type/geography resolve to the defaults
/// and absent thresholds resolve to the manager's configured defaults.
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Requested proxy type (defaults to residential)
    pub proxy_type: Option<ProxyType>,
    /// Requested geography code (defaults to GLOBAL)
    pub geography: Option<String>,
    /// Session identifier for sticky proxy reuse
    pub session_id: Option<String>,
    /// Proxy ids that must not be returned
    pub exclude: Vec<String>,
    /// Minimum success rate a candidate must hold
    pub min_success_rate: Option<f64>,
    /// Maximum captcha rate a candidate may hold
    pub max_captcha_rate: Option<f64>,
}

impl AcquireOptions {
    /// Criteria for a plain acquisition of the given type and geography
    pub fn for_pool(proxy_type: ProxyType, geography: &str) -> Self {
        Self {
            proxy_type: Some(proxy_type),
            geography: Some(geography.to_string()),
            ..Self::default()
        }
    }

    /// Same criteria bound to a session
    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }
}

/// Aggregated outcome of a batch of requests sent through one proxy
///
/// `success_count` travels on the wire for symmetry with the reporting
/// side, but the success-rate recompute works from `request_count` and
/// `failure_count`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub request_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub captcha_count: u64,
    #[serde(default)]
    pub avg_response_time_ms: f64,
}

impl UsageStats {
    /// Captcha hits as a fraction of the batch (0 for an empty batch)
    pub fn captcha_fraction(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.captcha_count as f64 / self.request_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_options_builders() {
        let options = AcquireOptions::for_pool(ProxyType::Mobile, "de").with_session("sess-1");
        assert_eq!(options.proxy_type, Some(ProxyType::Mobile));
        assert_eq!(options.geography.as_deref(), Some("de"));
        assert_eq!(options.session_id.as_deref(), Some("sess-1"));
        assert!(options.exclude.is_empty());
        assert!(options.min_success_rate.is_none());
    }

    #[test]
    fn test_usage_stats_captcha_fraction() {
        let stats = UsageStats {
            request_count: 10,
            captcha_count: 5,
            ..UsageStats::default()
        };
        assert!((stats.captcha_fraction() - 0.5).abs() < 1e-9);

        let empty = UsageStats::default();
        assert_eq!(empty.captcha_fraction(), 0.0);
    }

    #[test]
    fn test_usage_stats_deserialize_partial() {
        let stats: UsageStats = serde_json::from_str(r#"{"request_count": 4}"#).unwrap();
        assert_eq!(stats.request_count, 4);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.avg_response_time_ms, 0.0);
    }
}
