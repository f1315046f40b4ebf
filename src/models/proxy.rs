use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pool::PoolKey;
use super::request::UsageStats;

/// Weight kept from the previous value when smoothing captcha rate and
/// response time (the new sample contributes the remaining 0.2).
pub const SMOOTHING_FACTOR: f64 = 0.8;

/// Status derivation thresholds. Success rate below the blocked threshold or
/// captcha rate above it takes the proxy out of rotation entirely; the
/// degraded band keeps it selectable but flags it for replacement.
pub const BLOCKED_MIN_SUCCESS_RATE: f64 = 0.3;
pub const BLOCKED_MAX_CAPTCHA_RATE: f64 = 0.5;
pub const DEGRADED_MIN_SUCCESS_RATE: f64 = 0.7;
pub const DEGRADED_MAX_CAPTCHA_RATE: f64 = 0.3;

/// Proxy egress type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Residential,
    Datacenter,
    Mobile,
    Isp,
}

impl ProxyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Residential => "residential",
            ProxyType::Datacenter => "datacenter",
            ProxyType::Mobile => "mobile",
            ProxyType::Isp => "isp",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "residential" => Some(ProxyType::Residential),
            "datacenter" => Some(ProxyType::Datacenter),
            "mobile" => Some(ProxyType::Mobile),
            "isp" => Some(ProxyType::Isp),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProxyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operational proxy status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    #[default]
    Active,
    Degraded,
    Blocked,
    Cooldown,
}

impl ProxyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyStatus::Active => "active",
            ProxyStatus::Degraded => "degraded",
            ProxyStatus::Blocked => "blocked",
            ProxyStatus::Cooldown => "cooldown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ProxyStatus::Active),
            "degraded" => Some(ProxyStatus::Degraded),
            "blocked" => Some(ProxyStatus::Blocked),
            "cooldown" => Some(ProxyStatus::Cooldown),
            _ => None,
        }
    }

    /// Check if a proxy in this status may be handed to callers
    pub fn is_selectable(&self) -> bool {
        matches!(self, ProxyStatus::Active | ProxyStatus::Degraded)
    }
}

impl std::fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable health metrics for a proxy
///
/// This block is what gets serialized into the health store; identity and
/// connection details stay in static configuration. A proxy with no traffic
/// yet starts at a perfect success rate so it is eligible for selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyMetrics {
    pub success_rate: f64,
    pub captcha_rate: f64,
    pub avg_response_time_ms: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub blocked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            captcha_rate: 0.0,
            avg_response_time_ms: 0.0,
            total_requests: 0,
            failed_requests: 0,
            last_used: None,
            blocked_at: None,
            cooldown_until: None,
        }
    }
}

impl ProxyMetrics {
    /// Check if the cooldown window is still open
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| until > now).unwrap_or(false)
    }

    /// Derive the operational status from the metrics alone.
    ///
    /// Evaluation order matters: an open cooldown window wins over the rate
    /// thresholds, and the blocked band wins over the degraded band.
    pub fn derive_status(&self, now: DateTime<Utc>) -> ProxyStatus {
        if self.in_cooldown(now) {
            return ProxyStatus::Cooldown;
        }
        if self.success_rate < BLOCKED_MIN_SUCCESS_RATE
            || self.captcha_rate > BLOCKED_MAX_CAPTCHA_RATE
        {
            return ProxyStatus::Blocked;
        }
        if self.success_rate < DEGRADED_MIN_SUCCESS_RATE
            || self.captcha_rate > DEGRADED_MAX_CAPTCHA_RATE
        {
            return ProxyStatus::Degraded;
        }
        ProxyStatus::Active
    }

    /// Fold a batch usage report into the metrics.
    ///
    /// Success rate is a full recompute over the cumulative counters;
    /// captcha rate and response time are exponentially smoothed with
    /// weight 0.2 on the new sample. Empty batches are ignored.
    pub fn apply_usage(&mut self, stats: &UsageStats, now: DateTime<Utc>) {
        if stats.request_count == 0 {
            return;
        }

        self.total_requests = self.total_requests.saturating_add(stats.request_count);
        self.failed_requests = self.failed_requests.saturating_add(stats.failure_count);

        if self.total_requests > 0 {
            let succeeded = self.total_requests.saturating_sub(self.failed_requests);
            self.success_rate = succeeded as f64 / self.total_requests as f64;
        }

        let observed_captcha_rate = stats.captcha_count as f64 / stats.request_count as f64;
        self.captcha_rate = self.captcha_rate * SMOOTHING_FACTOR
            + observed_captcha_rate * (1.0 - SMOOTHING_FACTOR);

        self.avg_response_time_ms = self.avg_response_time_ms * SMOOTHING_FACTOR
            + stats.avg_response_time_ms * (1.0 - SMOOTHING_FACTOR);

        self.last_used = Some(now);
    }

    /// Wipe the rolling counters for a fresh trial after a cooldown expires.
    ///
    /// Success rate is recomputed from the cumulative counters on every
    /// usage report, so the counters themselves must go or the next report
    /// would immediately re-derive the pre-cooldown status.
    pub fn reset_for_trial(&mut self) {
        self.success_rate = 1.0;
        self.captcha_rate = 0.0;
        self.total_requests = 0;
        self.failed_requests = 0;
        self.blocked_at = None;
        self.cooldown_until = None;
    }
}

/// A single egress backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: String,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub proxy_type: ProxyType,
    pub geography: String,
    pub status: ProxyStatus,
    pub metrics: ProxyMetrics,
}

impl Proxy {
    /// The `(type, geography)` pool this proxy belongs to
    pub fn pool_key(&self) -> PoolKey {
        PoolKey::new(self.proxy_type, &self.geography)
    }

    /// Wire endpoint as `host:port`, the cross-namespace attribution key
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection string with optional embedded credentials
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("{}:{}@{}:{}", user, pass, self.host, self.port)
            }
            (Some(user), None) => format!("{}@{}:{}", user, self.host, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    /// Re-derive the status from the current metrics
    pub fn recompute_status(&mut self, now: DateTime<Utc>) {
        self.status = self.metrics.derive_status(now);
    }

    /// Check whether the proxy can currently be handed out
    pub fn is_selectable(&self, now: DateTime<Utc>) -> bool {
        self.status.is_selectable() && !self.metrics.in_cooldown(now)
    }
}
