//! Windowed counter: the chunked sliding-window algorithm.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use super::key::RecordKey;
use super::policy::WaitPolicy;
use super::window::WindowSpec;
use crate::error::{ChunkwiseError, Result};
use crate::store::KeyValueStore;

/// Outcome of a limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitStatus {
    /// Whether the identity has reached its limit
    pub limited: bool,
    /// Seconds until the identity may act again; 0 when not limited
    pub wait_seconds: u64,
}

impl LimitStatus {
    /// Status for an identity that may proceed.
    pub fn allowed() -> Self {
        Self {
            limited: false,
            wait_seconds: 0,
        }
    }

    /// Status for an identity that must wait.
    pub fn limited(wait_seconds: u64) -> Self {
        Self {
            limited: true,
            wait_seconds,
        }
    }
}

/// Counts the actions of one identity into a ring of time chunks.
///
/// The counter holds no mutable state of its own; every call goes to the
/// store, so any number of counters for the same identity, in any number of
/// processes, observe the same window.
pub struct WindowedCounter<S: KeyValueStore> {
    key: RecordKey,
    store_key: String,
    store: Arc<S>,
    window: WindowSpec,
    policy: WaitPolicy,
}

impl<S: KeyValueStore> WindowedCounter<S> {
    /// Create a new counter for `key`.
    pub fn new(key: RecordKey, store: Arc<S>, window: WindowSpec, policy: WaitPolicy) -> Self {
        let store_key = key.to_store_key();
        Self {
            key,
            store_key,
            store,
            window,
            policy,
        }
    }

    /// The record key this counter writes to.
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// The window this counter enforces.
    pub fn window(&self) -> WindowSpec {
        self.window
    }

    /// The wait policy this counter reports with.
    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Record `amount` actions in `chunk` and refresh the record's expiration.
    ///
    /// Both happen as one atomic store operation. Returns the chunk's new count.
    pub async fn increment(&self, chunk: u64, amount: u64) -> Result<u64> {
        if chunk >= self.window.total_chunks() {
            return Err(ChunkwiseError::InvalidArgument(format!(
                "chunk {} is outside [0, {})",
                chunk,
                self.window.total_chunks()
            )));
        }
        if amount == 0 {
            return Err(ChunkwiseError::InvalidArgument(
                "amount must be greater than zero".to_string(),
            ));
        }

        trace!(
            key = %self.key,
            chunk = chunk,
            amount = amount,
            "Incrementing chunk"
        );

        self.store
            .hash_increment_with_expiry(
                &self.store_key,
                chunk,
                amount,
                self.window.limit_duration(),
            )
            .await
    }

    /// Record a single action in the chunk for `now`.
    pub async fn increment_now(&self, now: u64) -> Result<u64> {
        self.increment(self.window.current_chunk(now), 1).await
    }

    /// Check whether the identity has reached its limit at `now`.
    ///
    /// The scan stops at the first chunk where the running sum reaches the
    /// threshold. A single large increment may jump past the threshold, so the
    /// trigger is `>=`.
    pub async fn check(&self, now: u64) -> Result<LimitStatus> {
        let total_chunks = self.window.total_chunks();
        let chunks: Vec<u64> = match self.policy {
            WaitPolicy::ChunkPosition => self
                .window
                .ordered_chunks(self.window.current_chunk(now))
                .collect(),
            WaitPolicy::RecordTtl => (0..total_chunks).collect(),
        };

        let counts = self.store.hash_get_many(&self.store_key, &chunks).await?;

        let mut sum: u64 = 0;
        for (idx, count) in counts.iter().enumerate() {
            sum = sum.saturating_add(count.unwrap_or(0));
            if sum < self.window.max_requests() {
                continue;
            }

            let wait_seconds = match self.policy {
                WaitPolicy::ChunkPosition => {
                    (total_chunks - idx as u64) * self.window.chunk_size_secs()
                }
                WaitPolicy::RecordTtl => match self.store.ttl(&self.store_key).await? {
                    Some(ttl) => ttl.as_secs(),
                    None => {
                        // Counters always write with an expiration, so a
                        // missing TTL means the record expired after the read.
                        trace!(key = %self.key, "Record expired during check");
                        return Ok(LimitStatus::allowed());
                    }
                },
            };

            debug!(
                key = %self.key,
                count = sum,
                wait_seconds = wait_seconds,
                policy = %self.policy,
                "Rate limit reached"
            );
            return Ok(LimitStatus::limited(wait_seconds));
        }

        trace!(key = %self.key, count = sum, "Within rate limit");
        Ok(LimitStatus::allowed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    /// Unix time at the start of a window cycle plus `chunk` chunks of 900s.
    fn at_chunk(chunk: u64) -> u64 {
        1_700_002_800 + chunk * 900
    }

    fn create_test_counter(policy: WaitPolicy) -> WindowedCounter<MemoryStore> {
        let window = WindowSpec::new(3600, 900, 100).unwrap();
        let key = RecordKey::new("test", "123").unwrap();
        WindowedCounter::new(key, Arc::new(MemoryStore::new()), window, policy)
    }

    #[test]
    fn test_cycle_start_helper() {
        let window = WindowSpec::new(3600, 900, 100).unwrap();
        assert_eq!(window.current_chunk(at_chunk(0)), 0);
        assert_eq!(window.current_chunk(at_chunk(3)), 3);
    }

    #[tokio::test]
    async fn test_fresh_identity_not_limited() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);

        let status = counter.check(at_chunk(0)).await.unwrap();
        assert_eq!(status, LimitStatus::allowed());
    }

    #[tokio::test]
    async fn test_below_limit() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);
        counter.increment(0, 99).await.unwrap();

        let status = counter.check(at_chunk(0)).await.unwrap();
        assert!(!status.limited);
        assert_eq!(status.wait_seconds, 0);
    }

    #[tokio::test]
    async fn test_limit_reached_at_chunk_0_current_0() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);
        counter.increment(0, 100).await.unwrap();

        let status = counter.check(at_chunk(0)).await.unwrap();
        assert_eq!(status, LimitStatus::limited(3600));
    }

    #[tokio::test]
    async fn test_limit_reached_at_chunk_0_current_3() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);
        counter.increment(0, 100).await.unwrap();

        let status = counter.check(at_chunk(3)).await.unwrap();
        assert_eq!(status, LimitStatus::limited(900));
    }

    #[tokio::test]
    async fn test_limit_reached_at_chunk_3_current_3() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);
        counter.increment(3, 100).await.unwrap();

        let status = counter.check(at_chunk(3)).await.unwrap();
        assert_eq!(status, LimitStatus::limited(3600));
    }

    #[tokio::test]
    async fn test_limit_reached_at_chunk_2_current_3() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);
        counter.increment(2, 100).await.unwrap();

        let status = counter.check(at_chunk(3)).await.unwrap();
        assert_eq!(status, LimitStatus::limited(2700));
    }

    #[tokio::test]
    async fn test_distributed_requests() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);
        counter.increment(0, 50).await.unwrap();
        counter.increment(2, 50).await.unwrap();

        // Walking back from chunk 3: chunk 2 brings the sum to 50, chunk 0
        // (offset 3) brings it to 100.
        let status = counter.check(at_chunk(3)).await.unwrap();
        assert_eq!(status, LimitStatus::limited(900));
    }

    #[tokio::test]
    async fn test_overshoot_still_limits() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);
        counter.increment(1, 60).await.unwrap();
        counter.increment(3, 70).await.unwrap();

        // 70 then 130: the sum never equals 100 exactly.
        let status = counter.check(at_chunk(3)).await.unwrap();
        assert_eq!(status, LimitStatus::limited(1800));
    }

    #[tokio::test]
    async fn test_check_is_idempotent() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);
        counter.increment(1, 100).await.unwrap();

        let first = counter.check(at_chunk(2)).await.unwrap();
        let second = counter.check(at_chunk(2)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, LimitStatus::limited(2700));
    }

    #[tokio::test]
    async fn test_increment_now_uses_current_chunk() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);

        for _ in 0..100 {
            counter.increment_now(at_chunk(2) + 17).await.unwrap();
        }

        let status = counter.check(at_chunk(2)).await.unwrap();
        assert_eq!(status, LimitStatus::limited(3600));
    }

    #[tokio::test]
    async fn test_increment_rejects_bad_arguments() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);

        assert!(matches!(
            counter.increment(4, 1).await,
            Err(ChunkwiseError::InvalidArgument(_))
        ));
        assert!(matches!(
            counter.increment(0, 0).await,
            Err(ChunkwiseError::InvalidArgument(_))
        ));
        assert_eq!(
            counter.check(at_chunk(0)).await.unwrap(),
            LimitStatus::allowed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_evicted_after_window() {
        let counter = create_test_counter(WaitPolicy::ChunkPosition);
        counter.increment(0, 100).await.unwrap();
        assert!(counter.check(at_chunk(0)).await.unwrap().limited);

        tokio::time::advance(Duration::from_secs(3600)).await;

        let status = counter.check(at_chunk(0)).await.unwrap();
        assert_eq!(status, LimitStatus::allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_ttl_policy_reports_store_ttl() {
        let counter = create_test_counter(WaitPolicy::RecordTtl);
        counter.increment(0, 50).await.unwrap();
        counter.increment(2, 50).await.unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;

        let status = counter.check(at_chunk(3)).await.unwrap();
        assert_eq!(status, LimitStatus::limited(3000));
    }

    #[tokio::test]
    async fn test_record_ttl_policy_not_limited() {
        let counter = create_test_counter(WaitPolicy::RecordTtl);
        counter.increment(1, 10).await.unwrap();

        let status = counter.check(at_chunk(1)).await.unwrap();
        assert_eq!(status, LimitStatus::allowed());
    }

    /// Serves counts from a live record but reports it gone on the TTL read.
    struct ExpiresBetweenReads(MemoryStore);

    #[async_trait::async_trait]
    impl KeyValueStore for ExpiresBetweenReads {
        async fn hash_increment(&self, key: &str, field: u64, amount: u64) -> Result<u64> {
            self.0.hash_increment(key, field, amount).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
            self.0.expire(key, ttl).await
        }

        async fn hash_increment_with_expiry(
            &self,
            key: &str,
            field: u64,
            amount: u64,
            ttl: Duration,
        ) -> Result<u64> {
            self.0.hash_increment_with_expiry(key, field, amount, ttl).await
        }

        async fn hash_get_many(&self, key: &str, fields: &[u64]) -> Result<Vec<Option<u64>>> {
            self.0.hash_get_many(key, fields).await
        }

        async fn ttl(&self, _key: &str) -> Result<Option<Duration>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_record_ttl_policy_record_expired_during_check() {
        let window = WindowSpec::new(3600, 900, 100).unwrap();
        let key = RecordKey::new("test", "123").unwrap();
        let store = Arc::new(ExpiresBetweenReads(MemoryStore::new()));
        let counter = WindowedCounter::new(key, store, window, WaitPolicy::RecordTtl);
        counter.increment(0, 100).await.unwrap();

        let status = counter.check(at_chunk(0)).await.unwrap();
        assert_eq!(status, LimitStatus::allowed());
    }

    #[tokio::test]
    async fn test_counters_share_store_state() {
        let store = Arc::new(MemoryStore::new());
        let window = WindowSpec::new(3600, 900, 100).unwrap();
        let key = RecordKey::new("test", "10.0.0.1").unwrap();

        let writer =
            WindowedCounter::new(key.clone(), store.clone(), window, WaitPolicy::default());
        let reader = WindowedCounter::new(key, store, window, WaitPolicy::default());

        writer.increment(1, 100).await.unwrap();
        assert!(reader.check(at_chunk(1)).await.unwrap().limited);
    }
}
