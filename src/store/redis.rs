use std::future::Future;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};

use crate::error::{RemudaError, Result};
use crate::store::HealthStore;

/// Redis-backed [`HealthStore`].
///
/// Uses a multiplexed connection per operation so concurrent callers never
/// queue behind each other. Every call is bounded by `op_timeout`; a slow or
/// unreachable server surfaces as [`RemudaError::StoreUnavailable`] instead
/// of stalling the caller.
pub struct RedisHealthStore {
    client: Client,
    op_timeout: Duration,
}

impl RedisHealthStore {
    /// Create a store from a connection URL (e.g. `redis://127.0.0.1:6379`).
    ///
    /// Only validates the URL; call [`HealthStore::ping`] to verify the
    /// server is actually reachable.
    pub fn new(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| RemudaError::InvalidConfig(format!("invalid Redis URL: {}", e)))?;

        Ok(Self { client, op_timeout })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        match tokio::time::timeout(
            self.op_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(RemudaError::StoreUnavailable(format!(
                "Redis connection failed: {}",
                e
            ))),
            Err(_) => Err(RemudaError::StoreUnavailable(
                "Redis connection timed out".to_string(),
            )),
        }
    }

    async fn bounded<T>(
        &self,
        op: &str,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RemudaError::StoreUnavailable(format!(
                "Redis {} failed: {}",
                op, e
            ))),
            Err(_) => Err(RemudaError::StoreUnavailable(format!(
                "Redis {} timed out",
                op
            ))),
        }
    }
}

#[async_trait::async_trait]
impl HealthStore for RedisHealthStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        self.bounded("GET", conn.get::<_, Option<String>>(key))
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let ttl_seconds = ttl.as_secs();

        if ttl_seconds > 0 {
            self.bounded("SETEX", conn.set_ex::<_, _, ()>(key, value, ttl_seconds))
                .await
        } else {
            self.bounded("SET", conn.set::<_, _, ()>(key, value)).await
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        self.bounded("DEL", conn.del::<_, ()>(key)).await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        self.bounded("PING", redis::cmd("PING").query_async::<()>(&mut conn))
            .await
    }
}

impl std::fmt::Debug for RedisHealthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisHealthStore")
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}
