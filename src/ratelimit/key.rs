//! Record key generation for limited identities.

use crate::error::{ChunkwiseError, Result};

/// Prefix used for record keys when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "chunkwise";

/// A key that uniquely identifies one identity's window record in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Namespace shared by every record of one limiter
    pub prefix: String,
    /// The limited subject, e.g. a client IP
    pub identity: String,
}

impl RecordKey {
    /// Create a new record key. Empty or whitespace-only identities are rejected.
    pub fn new(prefix: &str, identity: &str) -> Result<Self> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(ChunkwiseError::InvalidIdentity(
                "identity must not be empty".to_string(),
            ));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            identity: identity.to_string(),
        })
    }

    /// Convert the record key to the string used in the store.
    pub fn to_store_key(&self) -> String {
        if self.prefix.is_empty() {
            self.identity.clone()
        } else {
            format!("{}:{}", self.prefix, self.identity)
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}
