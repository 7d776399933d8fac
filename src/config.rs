//! TOML configuration.
//!
//! Every table and key is optional; a missing file section falls back to the
//! same defaults the CLI uses. Command-line flags override file values.
//!
//! ```toml
//! [chunking]
//! max_chunk_size = 500
//! min_chunk_size = 100
//! overlap_size = 50
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [indexing]
//! concurrency = 4
//! batch_size = 16
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::chunk::{ChunkerOptions, MIN_MAX_CHUNK_SIZE};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            overlap_size: default_overlap_size(),
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkerOptions {
        ChunkerOptions {
            max_chunk_size: self.max_chunk_size,
            min_chunk_size: self.min_chunk_size,
            overlap_size: self.overlap_size,
        }
    }
}

fn default_max_chunk_size() -> usize {
    500
}
fn default_min_chunk_size() -> usize {
    100
}
fn default_overlap_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: default_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Limits for submitting chunks to the embedding provider.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Maximum embedding calls in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Chunks sent per embedding call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_batch_size() -> usize {
    16
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

/// Check cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chunk_size < MIN_MAX_CHUNK_SIZE {
        anyhow::bail!("chunking.max_chunk_size must be >= {}", MIN_MAX_CHUNK_SIZE);
    }

    if config.indexing.concurrency == 0 {
        anyhow::bail!("indexing.concurrency must be > 0");
    }
    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}
