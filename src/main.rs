use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chunkwise::config::ChunkwiseConfig;
use chunkwise::ratelimit::{unix_now, LimitStatus, RateLimiter};
use chunkwise::store::{KeyValueStore, MemoryStore, RedisStore};

/// Chunked sliding-window rate limiter.
#[derive(Debug, Parser)]
#[command(name = "chunkwise", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-process store instead of Redis
    #[arg(long, global = true)]
    memory: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report whether an identity is currently limited
    Check {
        /// Identity to check, e.g. a client IP
        identity: String,
    },
    /// Check an identity and record one action if it is not limited
    Admit {
        /// Identity to admit, e.g. a client IP
        identity: String,
    },
    /// Record actions for an identity
    Increment {
        /// Identity to record for
        identity: String,
        /// Chunk to record into; defaults to the current chunk
        #[arg(long)]
        chunk: Option<u64>,
        /// Number of actions to record
        #[arg(long, default_value_t = 1)]
        amount: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ChunkwiseConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    info!(
        limit_duration_secs = config.rate_limiting.limit_duration_secs,
        chunk_size_secs = config.rate_limiting.chunk_size_secs,
        max_requests = config.rate_limiting.max_requests,
        wait_policy = %config.rate_limiting.wait_policy,
        "Configuration loaded"
    );

    if cli.memory {
        warn!("Using in-process store; state is lost when this process exits");
        let limiter = RateLimiter::from_config(Arc::new(MemoryStore::new()), &config)?;
        return run(&cli, &limiter).await;
    }

    let url = config
        .store
        .resolved_redis_url()
        .context("No Redis URL configured; set store.redis_url or REDIS_URL, or pass --memory")?;
    let store = RedisStore::connect(&url)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", url))?;
    let limiter = RateLimiter::from_config(Arc::new(store), &config)?;
    run(&cli, &limiter).await
}

async fn run<S: KeyValueStore>(cli: &Cli, limiter: &RateLimiter<S>) -> anyhow::Result<ExitCode> {
    let now = unix_now();

    match &cli.command {
        Command::Check { identity } => {
            let status = limiter.check(identity, now).await?;
            print_status(cli.json, &status)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Admit { identity } => {
            let status = limiter.admit(identity, now).await?;
            print_status(cli.json, &status)?;
            Ok(ExitCode::from(admit_exit_status(&status)))
        }
        Command::Increment {
            identity,
            chunk,
            amount,
        } => {
            let counter = limiter.counter(identity)?;
            let chunk = chunk.unwrap_or_else(|| limiter.window().current_chunk(now));
            let count = counter.increment(chunk, *amount).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "chunk": chunk, "count": count }));
            } else {
                println!("chunk {} count {}", chunk, count);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_status(json: bool, status: &LimitStatus) -> anyhow::Result<()> {
    println!("{}", render_status(json, status)?);
    Ok(())
}

/// Text printed for a check or admit result.
fn render_status(json: bool, status: &LimitStatus) -> serde_json::Result<String> {
    if json {
        serde_json::to_string(status)
    } else if status.limited {
        Ok(format!(
            "Rate limit exceeded. Try again in {} seconds",
            status.wait_seconds
        ))
    } else {
        Ok("OK".to_string())
    }
}

/// Process exit status for `admit`: non-zero when the identity was rejected.
fn admit_exit_status(status: &LimitStatus) -> u8 {
    if status.limited {
        1
    } else {
        0
    }
}
