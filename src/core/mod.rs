pub mod config;
pub mod errors;

pub use config::{AppPaths, Config, EmbeddingConfig, GenerationConfig, RagConfig};
pub use errors::RagError;
