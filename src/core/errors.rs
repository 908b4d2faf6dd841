use thiserror::Error;

/// Error taxonomy for the retrieval-augmentation core.
///
/// `UnsupportedFormat`, `Load` and `EmptyInput` are rejected uploads the
/// user can fix; `EmbeddingService`, `Generation` and `Timeout` are
/// upstream-service failures the caller may retry. Absence of an index is
/// deliberately NOT an error — it surfaces as an empty retrieval result.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("failed to load document: {0}")]
    Load(String),
    #[error("document produced no indexable text")]
    EmptyInput,
    #[error("embedding service error: {0}")]
    EmbeddingService(String),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("index error: {0}")]
    Index(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingService(_) | RagError::Generation(_) | RagError::Timeout(_)
        )
    }
}
