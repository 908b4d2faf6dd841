//! Typed configuration for the retrieval pipeline.
//!
//! Every tunable lives here with a documented default instead of being
//! hardcoded at its call site. Values load from an optional TOML file;
//! API keys come from the environment only.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

/// Retrieval/grounding tunables.
///
/// Defaults follow the baseline the product converged on: chunks around
/// 800 characters with 100 of overlap, top-10 retrieval over a 30-chunk
/// MMR pool, and an 80% fuzzy-match bar for grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Trailing context carried into the next chunk.
    pub chunk_overlap: usize,
    /// Candidates shorter than this are discarded as noise.
    pub min_chunk_chars: usize,
    /// Number of chunks returned per query.
    pub top_k: usize,
    /// Candidate pool size for diversity-aware selection. Must be >= top_k.
    pub fetch_k: usize,
    /// Relevance/diversity blend for MMR. 1.0 is pure relevance.
    pub mmr_lambda: f32,
    /// Chunks from OCR'd images below this confidence are dropped at query time.
    pub ocr_confidence_threshold: f32,
    /// Hard budget for the assembled prompt context.
    pub max_context_chars: usize,
    /// Fuzzy-match ratio at or above which an answer fragment counts as grounded.
    pub grounding_threshold: f32,
    /// Answer fragments shorter than this are too trivial to score.
    pub min_fragment_chars: usize,
    /// Embedding transport retries on timeout/5xx.
    pub max_retries: u32,
    /// Exponential backoff base in milliseconds.
    pub retry_base_ms: u64,
    /// Per-request timeout for the embedding service.
    pub request_timeout_secs: u64,
    /// Overall budget for a generative-model call.
    pub generation_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            min_chunk_chars: 20,
            top_k: 10,
            fetch_k: 30,
            mmr_lambda: 0.7,
            ocr_confidence_threshold: 0.5,
            max_context_chars: 4000,
            grounding_threshold: 0.80,
            min_fragment_chars: 30,
            max_retries: 3,
            retry_base_ms: 250,
            request_timeout_secs: 30,
            generation_timeout_secs: 60,
        }
    }
}

/// Embedding service endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.huggingface.co".to_string(),
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            api_key_env: "HF_API_KEY".to_string(),
        }
    }
}

/// Generative model endpoint settings (OpenAI-compatible chat API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    /// Kept near zero so grounding is not undermined by creative rephrasing.
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rag: RagConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
}

impl Config {
    /// Load from a TOML file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| RagError::Internal(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| RagError::Internal(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        let rag = &self.rag;
        if rag.chunk_size == 0 {
            return Err(RagError::Internal("chunk_size must be positive".into()));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(RagError::Internal(
                "chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        if rag.fetch_k < rag.top_k {
            return Err(RagError::Internal("fetch_k must be >= top_k".into()));
        }
        if !(0.0..=1.0).contains(&rag.mmr_lambda) {
            return Err(RagError::Internal("mmr_lambda must be in [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&rag.grounding_threshold) {
            return Err(RagError::Internal(
                "grounding_threshold must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Well-known filesystem locations for durable state.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,
    pub log_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        Self::with_data_dir(data_dir)
    }

    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let index_dir = data_dir.join("index");
        let log_dir = data_dir.join("logs");
        let config_path = data_dir.join("deckmind.toml");

        for dir in [&data_dir, &index_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            index_dir,
            log_dir,
            config_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("DECKMIND_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".deckmind");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Deckmind");
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    if cfg!(target_os = "macos") {
        PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("Deckmind")
    } else {
        PathBuf::from(home).join(".local").join("share").join("deckmind")
    }
}
