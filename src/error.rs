use thiserror::Error;

use crate::models::ProxyType;

/// Unified error type for the Remuda library
#[derive(Error, Debug)]
pub enum RemudaError {
    // Selection errors
    #[error("No pool matches type {proxy_type} / geography {geography}")]
    NoSuitablePool {
        proxy_type: ProxyType,
        geography: String,
    },

    #[error("No proxy available in pool {pool}")]
    NoAvailableProxy { pool: String },

    #[error("Unknown proxy: {id}")]
    UnknownProxy { id: String },

    // Lifecycle errors
    #[error("Manager is not initialized")]
    NotInitialized,

    #[error("Manager is already initialized")]
    AlreadyInitialized,

    // Store errors
    #[error("Health store unavailable: {0}")]
    StoreUnavailable(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Remuda operations
pub type Result<T> = std::result::Result<T, RemudaError>;

impl RemudaError {
    /// Check whether retrying the same call can succeed without the caller
    /// changing its criteria (e.g. after backoff or a fallback source).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemudaError::NoAvailableProxy { .. } | RemudaError::StoreUnavailable(_)
        )
    }
}

// Convert from redis errors
impl From<redis::RedisError> for RemudaError {
    fn from(err: redis::RedisError) -> Self {
        RemudaError::StoreUnavailable(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for RemudaError {
    fn from(err: url::ParseError) -> Self {
        RemudaError::InvalidConfig(err.to_string())
    }
}
