//! Runtime configuration for shardfs.
//!
//! All knobs arrive on the command line; validation runs before any
//! subsystem starts so a bad flag aborts with a usage message instead of
//! half-starting the service.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Chunk granularity for cache admission and ranged downloads.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Placeholder size reported for a file until a read refines it.
pub const DEFAULT_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Cadence of the predictor loop.
pub const PREDICTOR_INTERVAL: Duration = Duration::from_millis(50);

/// Deadline for a single urgent download attempt.
pub const URGENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for a single prefetch download attempt.
pub const PREFETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Retry budget for urgent downloads on transient errors.
pub const URGENT_MAX_RETRIES: u32 = 3;

/// Prefetches fail fast; the predictor will simply try again later.
pub const PREFETCH_MAX_RETRIES: u32 = 0;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "shardfs", about = "Read-through S3 cache filesystem for training shards")]
pub struct Cli {
    /// Mount point for the filesystem.
    #[arg(long)]
    pub mount: PathBuf,

    /// S3 bucket name.
    #[arg(long)]
    pub bucket: String,

    /// AWS region (e.g. us-west-2).
    #[arg(long)]
    pub region: String,

    /// Key prefix inside the bucket.
    #[arg(long = "s3-prefix")]
    pub s3_prefix: Option<String>,

    /// Cache byte budget; accepts K/M/G suffixes (e.g. 16G, 512M).
    #[arg(long = "cache-size", value_parser = parse_size, default_value = "16G")]
    pub cache_size: u64,

    /// Number of download workers (1-128).
    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    /// Prefetch lookahead per access event (1-256).
    #[arg(long, default_value_t = 3)]
    pub lookahead: usize,

    /// File listing S3 keys in expected access order.
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Port for the metrics endpoint (1024-65535).
    #[arg(long = "metrics-port", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Raise log verbosity to debug and tee events to the trace file.
    #[arg(long = "enable-tracing")]
    pub enable_tracing: bool,

    /// Destination for traced events.
    #[arg(long = "trace-output", default_value = "trace.json")]
    pub trace_output: PathBuf,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mount: PathBuf,
    pub bucket: String,
    pub region: String,
    pub prefix: Option<String>,
    pub cache_size: u64,
    pub chunk_size: u64,
    pub workers: usize,
    pub lookahead: usize,
    pub manifest: Option<PathBuf>,
    pub metrics_port: u16,
    pub enable_tracing: bool,
    pub trace_output: PathBuf,
}

impl Config {
    /// Build a configuration from parsed arguments, rejecting out-of-range
    /// values before anything else starts.
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let config = Self {
            mount: cli.mount,
            bucket: cli.bucket,
            region: cli.region,
            prefix: cli.s3_prefix.filter(|p| !p.is_empty()),
            cache_size: cli.cache_size,
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: cli.workers,
            lookahead: cli.lookahead,
            manifest: cli.manifest,
            metrics_port: cli.metrics_port,
            enable_tracing: cli.enable_tracing,
            trace_output: cli.trace_output,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.cache_size < 1024 * 1024 {
            anyhow::bail!("cache size must be at least 1M");
        }
        if self.workers < 1 || self.workers > 128 {
            anyhow::bail!("workers must be between 1 and 128");
        }
        if self.lookahead < 1 || self.lookahead > 256 {
            anyhow::bail!("lookahead must be between 1 and 256");
        }
        if self.metrics_port < 1024 {
            anyhow::bail!("metrics port must be between 1024 and 65535");
        }
        Ok(())
    }
}

/// Parse a human-readable byte size: a decimal number with an optional
/// K/M/G suffix, case-insensitive. A bare number is taken as bytes.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();

    let (digits, multiplier) = match trimmed.chars().last() {
        Some(c) if c.is_ascii_digit() => (trimmed, 1u64),
        Some('k') | Some('K') => (&trimmed[..trimmed.len() - 1], 1024),
        Some('m') | Some('M') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        Some(c) => return Err(format!("unknown size suffix '{c}'")),
        None => return Err("empty size".to_string()),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{input}'"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{input}' overflows"))
}
