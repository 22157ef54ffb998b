//! factkeeper configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main factkeeper configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactKeeperConfig {
    /// Extraction pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Extraction service configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Fact store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Transcript input configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Review API server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl FactKeeperConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()
    }
}

/// Pipeline configuration: chunking, thresholds, call budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Messages per chunk
    pub chunk_size: usize,

    /// Messages shared between consecutive chunks
    pub overlap: usize,

    /// Candidates below this confidence are never persisted
    pub min_confidence: f64,

    /// Confidence demanded from the narrowed reprocessing prompt
    pub reprocess_min_confidence: f64,

    /// Messages inside a chunk above this similarity (0-100) are dropped
    pub message_similarity_threshold: u8,

    /// Facts at or above this similarity (0-100) are duplicates in the fallback pass
    pub fact_similarity_threshold: u8,

    /// Time budget for a single extraction call, in seconds
    pub call_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            overlap: 20,
            min_confidence: 0.75,
            reprocess_min_confidence: 0.8,
            message_similarity_threshold: 95,
            fact_similarity_threshold: 85,
            call_timeout_secs: 120,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("reprocess_min_confidence", self.reprocess_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be within [0, 1]")));
            }
        }
        if self.message_similarity_threshold > 100 || self.fact_similarity_threshold > 100 {
            return Err(Error::Config(
                "similarity thresholds must be within [0, 100]".to_string(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(Error::Config("call_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Extraction service (Anthropic Messages API) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// API base URL
    pub api_base: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Model used for extraction and deduplication
    pub model: String,

    /// Token budget for per-chunk extraction
    pub max_tokens: u32,

    /// Token budget for the deduplication pass
    pub dedup_max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com/v1".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 3000,
            dedup_max_tokens: 4000,
            temperature: 0.1,
        }
    }
}

/// Fact store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local, lost on exit
    Memory,
    /// JSON files under `storage.dir`
    #[default]
    File,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend type
    pub backend: StorageBackend,

    /// Base directory for the file backend
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            dir: dirs_next::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".factkeeper")
                .join("store"),
        }
    }
}

/// Transcript input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory holding `<user_id>.json` transcripts
    pub dir: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("input_jsons"),
        }
    }
}

/// Review API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18800,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}
