//! Window geometry: how wall-clock time maps onto a ring of chunks.

use std::time::Duration;

use crate::error::{ChunkwiseError, Result};

/// Default length of the rolling window, in seconds.
pub const DEFAULT_LIMIT_DURATION_SECS: u64 = 3600;
/// Default chunk granularity, in seconds.
///
/// Smaller chunks give a more accurate wait time at the cost of more fields
/// read per check.
pub const DEFAULT_CHUNK_SIZE_SECS: u64 = 300;
/// Default number of actions allowed per window.
pub const DEFAULT_MAX_REQUESTS: u64 = 100;

/// Validated window parameters for a limiter.
///
/// The window of `limit_duration` seconds is split into `total_chunks` slots of
/// `chunk_size` seconds each. Slots are reused every `limit_duration` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    limit_duration_secs: u64,
    chunk_size_secs: u64,
    max_requests: u64,
}

impl WindowSpec {
    /// Create a new window, rejecting zero values and chunk sizes that do not
    /// evenly divide the window.
    pub fn new(limit_duration_secs: u64, chunk_size_secs: u64, max_requests: u64) -> Result<Self> {
        if limit_duration_secs == 0 {
            return Err(ChunkwiseError::Config(
                "limit duration must be greater than zero".to_string(),
            ));
        }
        if chunk_size_secs == 0 {
            return Err(ChunkwiseError::Config(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(ChunkwiseError::Config(
                "max requests must be greater than zero".to_string(),
            ));
        }
        if limit_duration_secs % chunk_size_secs != 0 {
            return Err(ChunkwiseError::Config(format!(
                "chunk size {}s does not evenly divide limit duration {}s",
                chunk_size_secs, limit_duration_secs
            )));
        }

        Ok(Self {
            limit_duration_secs,
            chunk_size_secs,
            max_requests,
        })
    }

    /// Length of the rolling window in seconds.
    pub fn limit_duration_secs(&self) -> u64 {
        self.limit_duration_secs
    }

    /// Length of the rolling window.
    pub fn limit_duration(&self) -> Duration {
        Duration::from_secs(self.limit_duration_secs)
    }

    /// Chunk granularity in seconds.
    pub fn chunk_size_secs(&self) -> u64 {
        self.chunk_size_secs
    }

    /// Threshold at which an identity becomes limited.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Number of chunk slots in the ring.
    pub fn total_chunks(&self) -> u64 {
        self.limit_duration_secs / self.chunk_size_secs
    }

    /// Slot index for the given unix timestamp, in `[0, total_chunks)`.
    pub fn current_chunk(&self, now: u64) -> u64 {
        (now % self.limit_duration_secs) / self.chunk_size_secs
    }

    /// All slots, starting at `current` and walking backwards around the ring.
    pub fn ordered_chunks(&self, current: u64) -> impl Iterator<Item = u64> {
        let total = self.total_chunks();
        let current = current % total;
        (0..total).map(move |i| (current + total - i) % total)
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            limit_duration_secs: DEFAULT_LIMIT_DURATION_SECS,
            chunk_size_secs: DEFAULT_CHUNK_SIZE_SECS,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

/// Current wall-clock time as unix seconds.
///
/// Writers and readers must share this clock so that every process maps the
/// same instant onto the same chunk.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
