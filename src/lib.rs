use thiserror::Error;

pub type Result<T> = std::result::Result<T, BriefcastError>;

#[derive(Error, Debug)]
pub enum BriefcastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Duplicate article: {0}")]
    DuplicateArticle(String),

    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding quota exceeded: {0}")]
    EmbeddingQuotaExceeded(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vectorization failed for article {fingerprint} after {attempts} attempt(s): {reason}")]
    VectorizationFailed {
        fingerprint: String,
        attempts: u32,
        reason: String,
    },

    #[error("Index metric mismatch: index was created with '{existing}' but '{requested}' was requested")]
    IndexMetricMismatch { existing: String, requested: String },

    #[error("Summary not generated for article {0}")]
    SummaryNotGenerated(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod article;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod script;
pub mod search;
