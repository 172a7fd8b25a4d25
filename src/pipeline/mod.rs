#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::article::Article;
use crate::chunking::{split_article, ChunkingConfig};
use crate::database::lancedb::vector_store::VectorIndex;
use crate::database::lancedb::VectorRecord;
use crate::database::sqlite::models::NewChunkRow;
use crate::database::sqlite::Database;
use crate::embeddings::EmbeddingBackend;
use crate::{BriefcastError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Articles vectorized concurrently.
    pub max_concurrency: usize,
    /// Embedding attempts per article before giving up.
    pub retry_attempts: u32,
    /// First retry delay; doubles on each subsequent attempt.
    pub backoff_base_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            retry_attempts: 3,
            backoff_base_ms: 500,
        }
    }
}

/// Outcome of one pipeline run over the pending set.
#[derive(Debug, Default)]
pub struct VectorizationReport {
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub chunks_indexed: usize,
    pub failures: Vec<VectorizationFailure>,
}

#[derive(Debug)]
pub struct VectorizationFailure {
    pub fingerprint: String,
    pub reason: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ArticleOutcome {
    /// Vectorized in this call; carries the number of chunks indexed.
    Indexed(usize),
    /// Already vectorized, or claimed by another in-flight worker.
    Skipped,
}

/// Cross-store comparison between the SQLite chunk mirror and the vector
/// index, per vectorized article.
#[derive(Debug, Default)]
pub struct ConsistencyReport {
    pub checked: usize,
    pub mismatches: Vec<ConsistencyMismatch>,
}

#[derive(Debug)]
pub struct ConsistencyMismatch {
    pub fingerprint: String,
    pub mirrored_chunks: i64,
    pub indexed_vectors: usize,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Drives unvectorized articles through chunking, embedding and indexing.
///
/// The vectorized flag is a one-way gate flipped only after every chunk is
/// durably indexed, and the flip is a compare-and-set, so an article is never
/// counted twice even with concurrent workers. An in-process claim set keeps
/// workers of this instance from racing on the same article between the
/// pending query and the flag flip.
#[derive(Clone)]
pub struct Vectorizer {
    database: Database,
    index: Arc<tokio::sync::Mutex<VectorIndex>>,
    embedder: Arc<dyn EmbeddingBackend>,
    chunking: ChunkingConfig,
    config: PipelineConfig,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Vectorizer {
    pub fn new(
        database: Database,
        index: Arc<tokio::sync::Mutex<VectorIndex>>,
        embedder: Arc<dyn EmbeddingBackend>,
        chunking: ChunkingConfig,
        config: PipelineConfig,
    ) -> Self {
        Self {
            database,
            index,
            embedder,
            chunking,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Vectorize everything currently pending. One article failing never
    /// aborts the run; it lands in the report instead.
    pub async fn process_pending(&self) -> Result<VectorizationReport> {
        let pending = self.database.find_pending().await?;
        if pending.is_empty() {
            info!("no articles pending vectorization");
            return Ok(VectorizationReport::default());
        }

        info!("vectorizing {} pending article(s)", pending.len());

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut handles = Vec::with_capacity(pending.len());

        for article in pending {
            let worker = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let fingerprint = article.fingerprint.clone();
                (fingerprint, worker.process_article(article).await)
            }));
        }

        let mut report = VectorizationReport::default();
        for handle in handles {
            let (fingerprint, outcome) = handle
                .await
                .map_err(|e| BriefcastError::Database(format!("vectorization task panicked: {e}")))?;

            match outcome {
                Ok(ArticleOutcome::Indexed(chunks)) => {
                    report.chunks_indexed += chunks;
                    report.processed.push(fingerprint);
                }
                Ok(ArticleOutcome::Skipped) => report.skipped.push(fingerprint),
                Err(e) => {
                    warn!("vectorization of {fingerprint} failed: {e}");
                    report.failures.push(VectorizationFailure {
                        fingerprint,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "vectorization run complete: {} processed, {} skipped, {} failed",
            report.processed.len(),
            report.skipped.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Vectorize a single article, idempotently. Returns `Skipped` when the
    /// article is already vectorized or claimed by another worker.
    pub async fn process_article(&self, article: Article) -> Result<ArticleOutcome> {
        if article.vectorized {
            return Ok(ArticleOutcome::Skipped);
        }

        // Claim the article within this process.
        {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| BriefcastError::Database("in-flight set poisoned".to_string()))?;
            if !in_flight.insert(article.fingerprint.clone()) {
                debug!("article {} already in flight", article.fingerprint);
                return Ok(ArticleOutcome::Skipped);
            }
        }

        let fingerprint = article.fingerprint.clone();
        let outcome = self.vectorize_inner(article).await;

        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&fingerprint);
        }

        outcome
    }

    async fn vectorize_inner(&self, article: Article) -> Result<ArticleOutcome> {
        let fingerprint = article.fingerprint.clone();
        let chunks = split_article(&article, &self.chunking);

        // An empty body vectorizes trivially: nothing to embed, flag flips.
        if chunks.is_empty() {
            self.database.replace_chunks(&fingerprint, &[]).await?;
            self.index.lock().await.upsert_article(&fingerprint, &[]).await?;
            if !self.database.mark_vectorized(&fingerprint).await? {
                return Ok(ArticleOutcome::Skipped);
            }
            debug!("article {fingerprint} has an empty body, marked vectorized");
            return Ok(ArticleOutcome::Indexed(0));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embed_with_retry(&fingerprint, texts).await?;

        let created_at = Utc::now().to_rfc3339();
        let tags_snapshot = if article.tags.is_empty() {
            None
        } else {
            Some(article.tags.join(","))
        };

        let mut records = Vec::with_capacity(chunks.len());
        let mut mirror_rows = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let vector_id = Uuid::new_v4().to_string();
            records.push(VectorRecord {
                id: vector_id.clone(),
                vector,
                article_fingerprint: fingerprint.clone(),
                chunk_index: chunk.index,
                content: chunk.content.clone(),
                domain: article.domain.clone(),
                published_at: article.published_at.map(|d| d.to_string()),
                tags: tags_snapshot.clone(),
                created_at: created_at.clone(),
            });
            mirror_rows.push(NewChunkRow {
                article_fingerprint: fingerprint.clone(),
                chunk_index: i64::from(chunk.index),
                content: chunk.content.clone(),
                vector_id,
            });
        }

        // Old vectors are dropped inside the upsert, so a re-index is always
        // wholesale. The flag flip comes last: everything before it can fail
        // and the article simply stays pending.
        self.index
            .lock()
            .await
            .upsert_article(&fingerprint, &records)
            .await?;

        if let Err(e) = self.finish_indexing(&fingerprint, &mirror_rows).await {
            // Roll the index back so the pending article is not half-visible
            // in search.
            if let Err(rollback) = self.index.lock().await.delete_by_article(&fingerprint).await {
                warn!("rollback of {fingerprint} failed: {rollback}");
            }
            return Err(e);
        }

        info!("vectorized article {fingerprint} ({} chunks)", records.len());
        Ok(ArticleOutcome::Indexed(records.len()))
    }

    async fn finish_indexing(&self, fingerprint: &str, rows: &[NewChunkRow]) -> Result<()> {
        self.database.replace_chunks(fingerprint, rows).await?;
        if !self.database.mark_vectorized(fingerprint).await? {
            // Lost the compare-and-set; another process finished first.
            debug!("article {fingerprint} was marked vectorized concurrently");
        }
        Ok(())
    }

    /// Run the blocking embedding call with exponential backoff. Only errors
    /// the backend classified as retryable are retried; a fatal error aborts
    /// immediately.
    async fn embed_with_retry(
        &self,
        fingerprint: &str,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>> {
        let mut last_reason = String::new();

        for attempt in 1..=self.config.retry_attempts.max(1) {
            let embedder = Arc::clone(&self.embedder);
            let batch = texts.clone();
            let result = tokio::task::spawn_blocking(move || embedder.embed_batch(&batch))
                .await
                .map_err(|e| BriefcastError::Embedding(format!("embedding task panicked: {e}")))?;

            match result {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "embedding attempt {attempt}/{} for {fingerprint} failed: {e}",
                        self.config.retry_attempts
                    );
                    last_reason = e.to_string();
                    if attempt < self.config.retry_attempts {
                        let delay = self.config.backoff_base_ms * 2u64.pow(attempt - 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BriefcastError::VectorizationFailed {
            fingerprint: fingerprint.to_string(),
            attempts: self.config.retry_attempts,
            reason: last_reason,
        })
    }

    /// Compare the chunk mirror against the vector index for every
    /// vectorized article.
    pub async fn verify_consistency(&self) -> Result<ConsistencyReport> {
        let articles = self.database.find_all().await?;
        let mut report = ConsistencyReport::default();

        for article in articles.iter().filter(|a| a.vectorized) {
            let mirrored = self.database.chunk_count(&article.fingerprint).await?;
            let indexed = self
                .index
                .lock()
                .await
                .count_for_article(&article.fingerprint)
                .await?;

            report.checked += 1;
            if mirrored != indexed as i64 {
                report.mismatches.push(ConsistencyMismatch {
                    fingerprint: article.fingerprint.clone(),
                    mirrored_chunks: mirrored,
                    indexed_vectors: indexed,
                });
            }
        }

        Ok(report)
    }
}
