//! Redis-backed store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use super::KeyValueStore;
use crate::error::{ChunkwiseError, Result};

/// A [`KeyValueStore`] backed by Redis hashes.
///
/// Holds a [`redis::aio::ConnectionManager`], which reconnects on its own and
/// is cheap to clone, so one `RedisStore` can be shared by every limiter.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl RedisStore {
    /// Open a client for `url` and establish a managed connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        Self::from_client(client).await
    }

    /// Create a store from an existing [`redis::Client`].
    pub async fn from_client(client: Client) -> Result<Self> {
        let connection_manager = client.get_connection_manager().await?;
        info!(
            addr = %client.get_connection_info().addr,
            "Connected to Redis"
        );
        Ok(Self { connection_manager })
    }

    fn connection(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

fn to_delta(amount: u64) -> Result<i64> {
    i64::try_from(amount)
        .map_err(|_| ChunkwiseError::InvalidArgument(format!("amount {} is too large", amount)))
}

fn ttl_secs(ttl: Duration) -> i64 {
    // EXPIRE with 0 deletes the key outright.
    ttl.as_secs().clamp(1, i64::MAX as u64) as i64
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn hash_increment(&self, record_key: &str, field: u64, amount: u64) -> Result<u64> {
        let mut conn = self.connection();
        let value: i64 = conn.hincr(record_key, field, to_delta(amount)?).await?;
        Ok(value.max(0) as u64)
    }

    async fn expire(&self, record_key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection();
        let _: i64 = conn.expire(record_key, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn hash_increment_with_expiry(
        &self,
        record_key: &str,
        field: u64,
        amount: u64,
        ttl: Duration,
    ) -> Result<u64> {
        let mut conn = self.connection();
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .hincr(record_key, field, to_delta(amount)?)
            .expire(record_key, ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(key = %record_key, field = field, value = value, "HINCRBY+EXPIRE");
        Ok(value.max(0) as u64)
    }

    async fn hash_get_many(&self, record_key: &str, fields: &[u64]) -> Result<Vec<Option<u64>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection();
        let values: Vec<Option<i64>> = redis::cmd("HMGET")
            .arg(record_key)
            .arg(fields)
            .query_async(&mut conn)
            .await?;

        Ok(values
            .into_iter()
            .map(|v| v.map(|v| v.max(0) as u64))
            .collect())
    }

    async fn ttl(&self, record_key: &str) -> Result<Option<Duration>> {
        let mut conn = self.connection();
        // -2 means the key is missing, -1 means it has no expiration.
        let secs: i64 = conn.ttl(record_key).await?;
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_secs_never_zero() {
        assert_eq!(ttl_secs(Duration::from_millis(200)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(3600)), 3600);
    }

    #[test]
    fn test_to_delta_rejects_overflow() {
        assert_eq!(to_delta(5).unwrap(), 5);
        assert!(matches!(
            to_delta(u64::MAX),
            Err(ChunkwiseError::InvalidArgument(_))
        ));
    }
}
