pub mod ollama;

use thiserror::Error;

use crate::BriefcastError;

/// Classified embedding backend failures. The backend never retries on its
/// own; retryable errors bubble up to the vectorization pipeline, which owns
/// the backoff schedule.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport failures and server-side errors. Worth retrying.
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
    /// Rate limiting (HTTP 429). Worth retrying after backoff.
    #[error("embedding backend rate limited: {0}")]
    QuotaExceeded(String),
    /// Anything else: bad request, malformed response, dimension mismatch.
    /// Retrying cannot help.
    #[error("embedding backend error: {0}")]
    Backend(String),
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Unavailable(_) | EmbeddingError::QuotaExceeded(_)
        )
    }
}

impl From<EmbeddingError> for BriefcastError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::Unavailable(msg) => BriefcastError::EmbeddingUnavailable(msg),
            EmbeddingError::QuotaExceeded(msg) => BriefcastError::EmbeddingQuotaExceeded(msg),
            EmbeddingError::Backend(msg) => BriefcastError::Embedding(msg),
        }
    }
}

/// Text-to-vector backend. Implementations are blocking; async callers run
/// them through `spawn_blocking`.
pub trait EmbeddingBackend: Send + Sync {
    /// Dimensionality every returned vector must have.
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError>;

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError>;
}
