//! Key-value store abstraction backing the limiter.
//!
//! Every limiter instance, in every process, shares window state through a
//! store implementing [`KeyValueStore`]. The store owns its connections; the
//! limiter only holds a shared handle to it.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Trait for the expiring hash store the limiter counts into.
///
/// Records are hashes keyed by chunk index. A record disappears as a whole
/// once its expiration passes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically add `amount` to `field` of the record, creating both if absent.
    ///
    /// Returns the new value of the field.
    async fn hash_increment(&self, record_key: &str, field: u64, amount: u64) -> Result<u64>;

    /// Set or refresh the record's time-to-live. A missing record is left alone.
    async fn expire(&self, record_key: &str, ttl: Duration) -> Result<()>;

    /// Increment a field and refresh the record's time-to-live as one atomic unit.
    ///
    /// No reader may observe the incremented field without the refreshed
    /// expiration, or the other way around.
    async fn hash_increment_with_expiry(
        &self,
        record_key: &str,
        field: u64,
        amount: u64,
        ttl: Duration,
    ) -> Result<u64>;

    /// Read many fields at once, in the requested order. Absent fields are `None`.
    async fn hash_get_many(&self, record_key: &str, fields: &[u64]) -> Result<Vec<Option<u64>>>;

    /// Remaining time-to-live of the record.
    ///
    /// `None` when the record does not exist or has no expiration.
    async fn ttl(&self, record_key: &str) -> Result<Option<Duration>>;
}
