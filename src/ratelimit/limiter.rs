//! Rate limiter entry point shared by all callers.

use std::sync::Arc;
use tracing::debug;

use super::counter::{LimitStatus, WindowedCounter};
use super::key::{RecordKey, DEFAULT_KEY_PREFIX};
use super::policy::WaitPolicy;
use super::window::WindowSpec;
use crate::config::ChunkwiseConfig;
use crate::error::Result;
use crate::store::KeyValueStore;

/// Hands out [`WindowedCounter`]s that share one store and one window.
///
/// Cheap to clone; clones share the same store handle.
pub struct RateLimiter<S: KeyValueStore> {
    store: Arc<S>,
    window: WindowSpec,
    policy: WaitPolicy,
    key_prefix: String,
}

impl<S: KeyValueStore> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            window: self.window,
            policy: self.policy,
            key_prefix: self.key_prefix.clone(),
        }
    }
}

impl<S: KeyValueStore> RateLimiter<S> {
    /// Create a new rate limiter.
    pub fn new(store: Arc<S>, window: WindowSpec, policy: WaitPolicy) -> Self {
        Self {
            store,
            window,
            policy,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Create a rate limiter from loaded configuration.
    ///
    /// Fails if the configured window is invalid.
    pub fn from_config(store: Arc<S>, config: &ChunkwiseConfig) -> Result<Self> {
        let window = config.rate_limiting.window()?;
        Ok(Self::new(store, window, config.rate_limiting.wait_policy)
            .with_key_prefix(&config.store.key_prefix))
    }

    /// Use a different namespace for record keys.
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    /// The window enforced by this limiter.
    pub fn window(&self) -> WindowSpec {
        self.window
    }

    /// Build the counter for `identity`. Empty identities are rejected.
    pub fn counter(&self, identity: &str) -> Result<WindowedCounter<S>> {
        let key = RecordKey::new(&self.key_prefix, identity)?;
        Ok(WindowedCounter::new(
            key,
            self.store.clone(),
            self.window,
            self.policy,
        ))
    }

    /// Check whether `identity` is limited at `now` without recording anything.
    pub async fn check(&self, identity: &str, now: u64) -> Result<LimitStatus> {
        self.counter(identity)?.check(now).await
    }

    /// Check `identity` and, if it is not limited, record one action.
    ///
    /// The check and the increment are separate store calls, so concurrent
    /// requests from one identity can all pass before any of them is counted.
    pub async fn admit(&self, identity: &str, now: u64) -> Result<LimitStatus> {
        let counter = self.counter(identity)?;

        let status = counter.check(now).await?;
        if status.limited {
            debug!(
                identity = %identity,
                wait_seconds = status.wait_seconds,
                "Rejecting limited identity"
            );
            return Ok(status);
        }

        counter.increment_now(now).await?;
        Ok(status)
    }
}
