use std::env;
use std::time::Duration;

use crate::error::{RemudaError, Result};
use crate::manager::ManagerConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Health store configuration
    pub store: StoreConfig,
    /// Manager tuning knobs
    pub manager: ManagerConfig,
    /// Path to the JSON pool provisioning file (daemon only)
    pub pools_file: String,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis connection URL (default: redis://127.0.0.1:6379)
    pub redis_url: String,
    /// Per-operation store timeout
    pub op_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let cooldown_mins = get_positive_u64("REMUDA_DEFAULT_COOLDOWN_MINS", "60")?;
        let metrics_ttl_days = get_positive_u64("REMUDA_METRICS_TTL_DAYS", "30")?;
        let session_ttl_days = get_positive_u64("REMUDA_SESSION_TTL_DAYS", "7")?;

        Ok(Config {
            store: StoreConfig {
                redis_url: get_env_or("REMUDA_REDIS_URL", "redis://127.0.0.1:6379"),
                op_timeout: Duration::from_secs(get_positive_u64(
                    "REMUDA_STORE_TIMEOUT_SECS",
                    "2",
                )?),
            },
            manager: ManagerConfig {
                default_cooldown: Duration::from_secs(cooldown_mins * 60),
                min_success_rate: get_rate("REMUDA_MIN_SUCCESS_RATE", "0.7")?,
                max_captcha_rate: get_rate("REMUDA_MAX_CAPTCHA_RATE", "0.3")?,
                rotate_min_success_rate: get_rate("REMUDA_ROTATE_MIN_SUCCESS_RATE", "0.8")?,
                rotate_max_captcha_rate: get_rate("REMUDA_ROTATE_MAX_CAPTCHA_RATE", "0.2")?,
                metrics_ttl: Duration::from_secs(metrics_ttl_days * 24 * 3600),
                session_ttl: Duration::from_secs(session_ttl_days * 24 * 3600),
                monitor_interval: Duration::from_secs(get_positive_u64(
                    "REMUDA_MONITOR_INTERVAL_SECS",
                    "300",
                )?),
            },
            pools_file: get_env_or("REMUDA_POOLS_FILE", "pools.json"),
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_positive_u64(key: &str, default: &str) -> Result<u64> {
    let value: u64 = get_env_or(key, default)
        .parse()
        .map_err(|_| RemudaError::InvalidConfig(format!("{} must be a whole number", key)))?;
    if value == 0 {
        return Err(RemudaError::InvalidConfig(format!(
            "{} must be greater than zero",
            key
        )));
    }
    Ok(value)
}

fn get_rate(key: &str, default: &str) -> Result<f64> {
    let value: f64 = get_env_or(key, default)
        .parse()
        .map_err(|_| RemudaError::InvalidConfig(format!("{} must be a number", key)))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(RemudaError::InvalidConfig(format!(
            "{} must be between 0 and 1",
            key
        )));
    }
    Ok(value)
}
