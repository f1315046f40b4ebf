//! Remuda - Proxy Resource Manager
//!
//! A proxy pool manager with health tracking written in Rust.
//!
//! ## Features
//!
//! - Pools keyed by proxy type and geography with per-pool rotation
//!   strategies (round-robin, least-used, performance)
//! - Health metrics with exponential smoothing and automatic status
//!   derivation (active, degraded, blocked, cooldown)
//! - Session affinity so a logical session keeps its exit IP
//! - Background monitor that reclaims proxies from expired cooldowns
//! - Redis-backed metric persistence with a best-effort contract: the
//!   manager keeps serving from memory when the store is down

pub mod config;
pub mod error;
pub mod fallback;
pub mod manager;
pub mod models;
pub mod store;

pub use config::Config;
pub use error::{RemudaError, Result};
pub use manager::{ManagerConfig, ProxyManager};
pub use models::{AcquireOptions, Proxy, ProxyStatus, ProxyType, UsageStats};
