//! Error types for Chunkwise.

use thiserror::Error;

/// Main error type for Chunkwise operations.
#[derive(Error, Debug)]
pub enum ChunkwiseError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The identity is empty or otherwise unusable as a record key
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// A chunk index or amount outside its allowed range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Errors from other store implementations
    #[error("Store error: {0}")]
    Store(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for ChunkwiseError {
    fn from(err: ::config::ConfigError) -> Self {
        ChunkwiseError::Config(err.to_string())
    }
}

/// Result type alias for Chunkwise operations.
pub type Result<T> = std::result::Result<T, ChunkwiseError>;
