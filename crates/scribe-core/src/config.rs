//! Configuration types for the scribe retrieval system.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScribeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Index database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite index database.
    pub path: PathBuf,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: 30000,
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to the ONNX model file. When absent, the deterministic
    /// hashed embedder is used instead of a model.
    pub model_path: Option<PathBuf>,

    /// Path to the tokenizer.json file for the model.
    pub tokenizer_path: Option<PathBuf>,

    /// Output dimension of the configured model.
    #[serde(default = "default_model_dimension")]
    pub dimension: usize,

    /// Batch size for model inference.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Dimension for the hashed fallback embedder.
    #[serde(default = "default_hashed_dimension")]
    pub hashed_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            tokenizer_path: None,
            dimension: 1024,
            batch_size: 16,
            hashed_dimension: 256,
        }
    }
}

/// Chunk builder configuration.
///
/// Token counts are whitespace-delimited words; any consistent tokenizer
/// may be substituted as long as these two budgets stay comparable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum tokens per chunk.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Trailing tokens of a closed chunk re-seeded into the next buffer.
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 350,
            overlap_tokens: 50,
        }
    }
}

/// Query-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results fetched from the vector leg.
    #[serde(default = "default_top_k")]
    pub top_k_vector: usize,

    /// Results fetched from the lexical leg.
    #[serde(default = "default_top_k")]
    pub top_k_lexical: usize,

    /// Weight of the vector leg in hybrid fusion, in [0, 1].
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// RRF dampening constant. 60 is the conventional default; exposed
    /// for reproducibility testing, not per-request tuning.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k_vector: 20,
            top_k_lexical: 20,
            vector_weight: 0.6,
            rrf_k: 60.0,
        }
    }
}

/// Ingest pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory scanned for validated transcript JSON files.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Directory chunk artifacts are written under, one subdirectory
    /// per run tag.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Fixed run tag; derived from the clock when absent.
    pub run_tag: Option<String>,

    /// Optional fire-and-forget status notification endpoint.
    pub status_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            run_tag: None,
            status_url: None,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the query service.
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

// Default value functions

fn default_busy_timeout() -> u32 {
    30000
}

fn default_model_dimension() -> usize {
    1024
}

fn default_batch_size() -> usize {
    16
}

fn default_hashed_dimension() -> usize {
    256
}

fn default_max_tokens() -> usize {
    350
}

fn default_overlap_tokens() -> usize {
    50
}

fn default_top_k() -> usize {
    20
}

fn default_vector_weight() -> f32 {
    0.6
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_bind_address() -> String {
    "0.0.0.0:8002".to_string()
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scribe")
}

fn default_database_path() -> PathBuf {
    data_dir().join("index.db")
}

fn default_input_dir() -> PathBuf {
    data_dir().join("validated")
}

fn default_output_dir() -> PathBuf {
    data_dir().join("chunks")
}

impl ScribeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::ScribeError::config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config)
    }

    /// Load configuration from default paths, falling back to defaults.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("scribe").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("scribe.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScribeConfig::default();
        assert_eq!(config.chunking.max_tokens, 350);
        assert_eq!(config.chunking.overlap_tokens, 50);
        assert_eq!(config.search.vector_weight, 0.6);
        assert_eq!(config.search.rrf_k, 60.0);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml = r#"
            [chunking]
            max_tokens = 128

            [search]
            vector_weight = 0.5
        "#;
        let config: ScribeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.chunking.max_tokens, 128);
        assert_eq!(config.chunking.overlap_tokens, 50);
        assert_eq!(config.search.vector_weight, 0.5);
        assert_eq!(config.search.top_k_vector, 20);
        assert_eq!(config.embedding.dimension, 1024);
    }

    #[test]
    fn test_embedding_dimension_is_configurable() {
        let toml = r#"
            [embedding]
            dimension = 384
            batch_size = 8
        "#;
        let config: ScribeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.embedding.batch_size, 8);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:9000\"\n").unwrap();

        let config = ScribeConfig::load(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
    }
}
