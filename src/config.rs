//! Configuration module for the embeddings engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `EMBEDSQL_` and use double underscores
//! to separate nested levels:
//! - `EMBEDSQL_EMBEDDINGS__SCORING=bm25` sets `embeddings.scoring`
//! - `EMBEDSQL_EMBEDDINGS__BM25__K1=1.5` sets `embeddings.bm25.k1`
//! - `EMBEDSQL_DEBUG=true` sets `debug`

use crate::ann::AnnBackend;
use crate::error::{EmbeddingsError, EmbeddingsResult};
use crate::scoring::ScoringMethod;
use crate::vector::EmbeddingFallback;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File extension identifying a word-vector container.
pub const WORD_VECTORS_EXTENSION: &str = "wvec";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the index directory
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Embeddings index settings
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
}

/// Settings for a single embeddings index. Persisted verbatim in the index manifest.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingsConfig {
    /// Fastembed model name or path to a `.wvec` word-vector container
    #[serde(default = "default_model_path")]
    pub path: String,

    /// Store document text and data for SQL queries
    #[serde(default = "default_false")]
    pub content: bool,

    /// Keep the original full-precision vector with each stored row
    #[serde(default = "default_false")]
    pub storevectors: bool,

    /// Term weighting for word-vector embeddings
    #[serde(default)]
    pub scoring: ScoringMethod,

    /// Number of principal components removed from every vector (0 disables)
    #[serde(default)]
    pub pca: usize,

    /// Store index vectors as 8-bit codes
    #[serde(default = "default_false")]
    pub quantize: bool,

    /// Nearest-neighbor index backend
    #[serde(default)]
    pub backend: AnnBackend,

    /// Clusters scanned per query by the IVF backend
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,

    /// Documents embedded per batch
    #[serde(default = "default_batch")]
    pub batch: usize,

    /// Behavior when a text produces no embedding
    #[serde(default)]
    pub fallback: EmbeddingFallback,

    /// BM25 parameters
    #[serde(default)]
    pub bm25: Bm25Config,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Bm25Config {
    /// Term frequency saturation
    #[serde(default = "default_k1")]
    pub k1: f32,

    /// Document length normalization
    #[serde(default = "default_b")]
    pub b: f32,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".embedsql/index")
}
fn default_false() -> bool {
    false
}
fn default_model_path() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_nprobe() -> usize {
    8
}
fn default_batch() -> usize {
    32
}
fn default_k1() -> f32 {
    1.2
}
fn default_b() -> f32 {
    0.75
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            debug: false,
            embeddings: EmbeddingsConfig::default(),
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            content: false,
            storevectors: false,
            scoring: ScoringMethod::default(),
            pca: 0,
            quantize: false,
            backend: AnnBackend::default(),
            nprobe: default_nprobe(),
            batch: default_batch(),
            fallback: EmbeddingFallback::default(),
            bm25: Bm25Config::default(),
        }
    }
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
        }
    }
}

impl EmbeddingsConfig {
    /// Config for the given model path with every other setting at its default.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// True when `path` names a word-vector container.
    pub fn is_words(&self) -> bool {
        Path::new(&self.path)
            .extension()
            .is_some_and(|ext| ext == WORD_VECTORS_EXTENSION)
    }

    /// Reject settings no index can be built with.
    pub fn validate(&self) -> EmbeddingsResult<()> {
        if self.path.trim().is_empty() {
            return Err(EmbeddingsError::ConfigError {
                reason: "embeddings.path must name a model or a .wvec file".to_string(),
            });
        }
        if self.batch == 0 {
            return Err(EmbeddingsError::ConfigError {
                reason: "embeddings.batch must be at least 1".to_string(),
            });
        }
        if self.nprobe == 0 {
            return Err(EmbeddingsError::ConfigError {
                reason: "embeddings.nprobe must be at least 1".to_string(),
            });
        }
        if self.bm25.k1.is_nan() || self.bm25.k1 < 0.0 || !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(EmbeddingsError::ConfigError {
                reason: format!(
                    "bm25 parameters out of range: k1={} (>= 0), b={} (0..=1)",
                    self.bm25.k1, self.bm25.b
                ),
            });
        }
        if self.storevectors && !self.content {
            tracing::warn!("storevectors has no effect without content storage");
        }
        Ok(())
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .embedsql directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".embedsql/settings.toml"));

        Self::load_from(config_path)
    }

    /// Find the settings file by looking for a .embedsql directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(".embedsql"))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("EMBEDSQL_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}
