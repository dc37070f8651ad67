use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Largest plaintext chunk any reader accepts (1 MiB). Part of the wire
/// format: every peer decrypts against this bound.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Default payload chunk size for the streaming cipher
pub const DEFAULT_CHUNK_SIZE: usize = MAX_CHUNK_SIZE;

/// Top-level configuration (loaded from peerio.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerioConfig {
    pub stream: StreamConfig,
    pub pool: PoolConfig,
    pub log: LogConfig,
    /// TOML file mapping usernames to public-key IDs
    pub contacts_file: Option<PathBuf>,
}

impl PeerioConfig {
    /// Load from a TOML file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.stream.chunk_size) {
            return Err(CoreError::Config(format!(
                "stream.chunk_size must be in 1..={MAX_CHUNK_SIZE}, got {}",
                self.stream.chunk_size
            )));
        }
        if self.pool.queue_depth == 0 {
            return Err(CoreError::Config("pool.queue_depth must be at least 1".into()));
        }
        Ok(())
    }
}

/// Streaming cipher configuration.
///
/// Key derivation parameters are intentionally not configurable: changing
/// them changes every user's keypair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Plaintext bytes per chunk when encrypting (default and maximum:
    /// 1 MiB). Decryption always accepts chunks up to [`MAX_CHUNK_SIZE`].
    pub chunk_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Crypto worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker count (0 = cpu_count)
    pub workers: usize,
    /// Pending jobs allowed per worker before dispatch reports busy
    pub queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_depth: 16,
        }
    }
}

impl PoolConfig {
    /// Resolve `workers = 0` to the machine's available parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter (default: info); RUST_LOG overrides
    pub level: String,
    /// Output format: "text" or "json"
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}
