//! In-process store with lazy expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::KeyValueStore;
use crate::error::Result;

#[derive(Debug, Default)]
struct Record {
    fields: HashMap<u64, u64>,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A [`KeyValueStore`] kept in process memory.
///
/// State is not shared between processes, so this is only useful for tests
/// and single-instance deployments. Expiration follows `tokio::time`, which
/// lets tests drive it with a paused clock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Record>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub fn record_count(&self) -> usize {
        let now = Instant::now();
        self.records.retain(|_, record| !record.is_expired(now));
        self.records.len()
    }

    fn evict_if_expired(&self, record_key: &str, now: Instant) {
        self.records
            .remove_if(record_key, |_, record| record.is_expired(now));
    }

    fn increment_locked(
        &self,
        record_key: &str,
        field: u64,
        amount: u64,
        ttl: Option<Duration>,
    ) -> u64 {
        let now = Instant::now();
        // The entry guard holds the shard lock, so the field update and the
        // expiration change land together.
        let mut record = self.records.entry(record_key.to_string()).or_default();
        if record.is_expired(now) {
            *record = Record::default();
        }

        let count = record.fields.entry(field).or_insert(0);
        *count = count.saturating_add(amount);
        let value = *count;

        if let Some(ttl) = ttl {
            record.expires_at = Some(now + ttl);
        }
        value
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn hash_increment(&self, record_key: &str, field: u64, amount: u64) -> Result<u64> {
        Ok(self.increment_locked(record_key, field, amount, None))
    }

    async fn expire(&self, record_key: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        self.evict_if_expired(record_key, now);
        if let Some(mut record) = self.records.get_mut(record_key) {
            record.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn hash_increment_with_expiry(
        &self,
        record_key: &str,
        field: u64,
        amount: u64,
        ttl: Duration,
    ) -> Result<u64> {
        Ok(self.increment_locked(record_key, field, amount, Some(ttl)))
    }

    async fn hash_get_many(&self, record_key: &str, fields: &[u64]) -> Result<Vec<Option<u64>>> {
        self.evict_if_expired(record_key, Instant::now());
        let values = match self.records.get(record_key) {
            Some(record) => fields
                .iter()
                .map(|field| record.fields.get(field).copied())
                .collect(),
            None => vec![None; fields.len()],
        };
        Ok(values)
    }

    async fn ttl(&self, record_key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        self.evict_if_expired(record_key, now);
        Ok(self
            .records
            .get(record_key)
            .and_then(|record| record.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }
}
