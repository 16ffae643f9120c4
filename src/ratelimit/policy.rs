//! Wait-time policies for limited identities.

use serde::{Deserialize, Serialize};

/// How the wait reported to a limited identity is derived.
///
/// The two policies agree when all traffic lands in one chunk and diverge when
/// it is spread out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Walk the chunks from the current one backwards; the wait is the time
    /// until the chunk that crossed the threshold leaves the window.
    ///
    /// Depends only on chunk contents, never on store TTLs.
    #[default]
    ChunkPosition,
    /// Report the store's remaining TTL on the whole record.
    ///
    /// Coarser: this is the time until the entire record expires.
    RecordTtl,
}

impl std::fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitPolicy::ChunkPosition => write!(f, "chunk_position"),
            WaitPolicy::RecordTtl => write!(f, "record_ttl"),
        }
    }
}
