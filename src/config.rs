//! Configuration management for Chunkwise.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{ChunkwiseError, Result};
use crate::ratelimit::key::DEFAULT_KEY_PREFIX;
use crate::ratelimit::window::{
    WindowSpec, DEFAULT_CHUNK_SIZE_SECS, DEFAULT_LIMIT_DURATION_SECS, DEFAULT_MAX_REQUESTS,
};
use crate::ratelimit::WaitPolicy;

/// Prefix for environment variable overrides, e.g.
/// `CHUNKWISE__RATE_LIMITING__MAX_REQUESTS=50`.
const ENV_PREFIX: &str = "CHUNKWISE";

/// Main configuration for Chunkwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkwiseConfig {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis URL; `REDIS_URL` is used when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Namespace for record keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl StoreConfig {
    /// The configured Redis URL, falling back to the `REDIS_URL` environment variable.
    pub fn resolved_redis_url(&self) -> Option<String> {
        self.redis_url
            .clone()
            .or_else(|| std::env::var("REDIS_URL").ok())
            .filter(|url| !url.is_empty())
    }
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Length of the rolling window in seconds
    #[serde(default = "default_limit_duration")]
    pub limit_duration_secs: u64,

    /// Chunk granularity in seconds; must evenly divide the window
    #[serde(default = "default_chunk_size")]
    pub chunk_size_secs: u64,

    /// Actions allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// How the wait time is reported once limited
    #[serde(default)]
    pub wait_policy: WaitPolicy,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit_duration_secs: default_limit_duration(),
            chunk_size_secs: default_chunk_size(),
            max_requests: default_max_requests(),
            wait_policy: WaitPolicy::default(),
        }
    }
}

impl RateLimitingConfig {
    /// Validate the window parameters.
    pub fn window(&self) -> Result<WindowSpec> {
        WindowSpec::new(
            self.limit_duration_secs,
            self.chunk_size_secs,
            self.max_requests,
        )
    }
}

fn default_limit_duration() -> u64 {
    DEFAULT_LIMIT_DURATION_SECS
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE_SECS
}

fn default_max_requests() -> u64 {
    DEFAULT_MAX_REQUESTS
}

impl ChunkwiseConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ChunkwiseError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment variables take precedence over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config: ChunkwiseConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        // Surface window errors at startup rather than on the first request.
        config.rate_limiting.window()?;
        Ok(config)
    }
}
