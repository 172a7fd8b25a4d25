
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::article::Article;
use crate::database::lancedb::vector_store::VectorIndex;
use crate::database::lancedb::SearchHit;
use crate::database::sqlite::models::{ArticleCriteria, ChunkRow};
use crate::database::sqlite::Database;
use crate::embeddings::EmbeddingBackend;
use crate::{BriefcastError, Result};

/// Chunk hits fetched per requested article. Several chunks of one article
/// can outrank everything else, so the index is always over-queried before
/// collapsing to article granularity.
const CHUNK_FANOUT: usize = 4;

/// Hard ceiling on how far a filtered search will widen its chunk query.
const MAX_WIDENING_ROUNDS: u32 = 3;

/// An article ranked by its best chunk distance (smaller is closer).
#[derive(Debug, Clone)]
pub struct RankedArticle {
    pub article: Article,
    pub distance: f32,
}

pub struct SearchEngine {
    database: Database,
    index: Arc<tokio::sync::Mutex<VectorIndex>>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl SearchEngine {
    pub fn new(
        database: Database,
        index: Arc<tokio::sync::Mutex<VectorIndex>>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            database,
            index,
            embedder,
        }
    }

    /// Top `k` distinct articles nearest to `query`, best chunk wins.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<RankedArticle>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embed_query(query).await?;
        let hits = self
            .index
            .lock()
            .await
            .query(&vector, k.saturating_mul(CHUNK_FANOUT), None)
            .await?;

        let ranked = collapse_hits(&hits, k, None);
        self.load_ranked(ranked).await
    }

    /// Similarity search restricted to articles matching `criteria`.
    ///
    /// The metadata filter runs in SQLite first; vector hits are then
    /// post-filtered against that candidate set, widening the chunk query
    /// when the filter discards too many of them.
    pub async fn advanced_search(
        &self,
        query: &str,
        criteria: &ArticleCriteria,
        k: usize,
    ) -> Result<Vec<RankedArticle>> {
        if criteria.is_empty() {
            return self.similarity_search(query, k).await;
        }
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let candidates: HashSet<String> = self
            .database
            .find_by_criteria(criteria)
            .await?
            .into_iter()
            .filter(|a| a.vectorized)
            .map(|a| a.fingerprint)
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embed_query(query).await?;
        let mut limit = k.saturating_mul(CHUNK_FANOUT);
        let mut round = 0;

        loop {
            let hits = self.index.lock().await.query(&vector, limit, None).await?;
            let exhausted = hits.len() < limit;

            let ranked = collapse_hits(&hits, k, Some(&candidates));
            if ranked.len() >= k || exhausted || round == MAX_WIDENING_ROUNDS {
                debug!(
                    "filtered search settled after {round} widening round(s), {} article(s)",
                    ranked.len()
                );
                return self.load_ranked(ranked).await;
            }

            limit = limit.saturating_mul(2);
            round += 1;
        }
    }

    /// Full article bodies for the given fingerprints, order preserved.
    pub async fn retrieve_full_articles(&self, fingerprints: &[String]) -> Result<Vec<Article>> {
        let mut articles = Vec::with_capacity(fingerprints.len());
        for fingerprint in fingerprints {
            let article = self
                .database
                .find_by_fingerprint(fingerprint)
                .await?
                .ok_or_else(|| BriefcastError::ArticleNotFound(fingerprint.clone()))?;
            articles.push(article);
        }
        Ok(articles)
    }

    /// The stored chunks of the given articles, grouped per article in input
    /// order, each group in chunk order. Unvectorized articles simply
    /// contribute none yet.
    pub async fn retrieve_chunks(&self, fingerprints: &[String]) -> Result<Vec<ChunkRow>> {
        let mut chunks = Vec::new();
        for fingerprint in fingerprints {
            if self
                .database
                .find_by_fingerprint(fingerprint)
                .await?
                .is_none()
            {
                return Err(BriefcastError::ArticleNotFound(fingerprint.clone()));
            }
            chunks.extend(self.database.chunks_for_article(fingerprint).await?);
        }
        Ok(chunks)
    }

    /// Summaries for the given fingerprints. Every article must both exist
    /// and have a non-blank summary.
    pub async fn retrieve_summaries(
        &self,
        fingerprints: &[String],
    ) -> Result<Vec<(String, String)>> {
        let articles = self.retrieve_full_articles(fingerprints).await?;

        let mut summaries = Vec::with_capacity(articles.len());
        for article in articles {
            if !article.has_summary() {
                return Err(BriefcastError::SummaryNotGenerated(article.fingerprint));
            }
            let summary = article.summary.unwrap_or_default();
            summaries.push((article.fingerprint, summary));
        }
        Ok(summaries)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| BriefcastError::Embedding(format!("embedding task panicked: {e}")))??;
        Ok(vector)
    }

    async fn load_ranked(&self, ranked: Vec<(String, f32)>) -> Result<Vec<RankedArticle>> {
        let mut results = Vec::with_capacity(ranked.len());
        for (fingerprint, distance) in ranked {
            let article = self
                .database
                .find_by_fingerprint(&fingerprint)
                .await?
                .ok_or_else(|| BriefcastError::ArticleNotFound(fingerprint))?;
            results.push(RankedArticle { article, distance });
        }
        Ok(results)
    }
}

/// Collapse chunk hits to distinct articles, keeping each article's best
/// (first, since hits are distance-sorted) chunk distance. An optional allow
/// set drops articles outside a metadata filter.
fn collapse_hits(
    hits: &[SearchHit],
    k: usize,
    allowed: Option<&HashSet<String>>,
) -> Vec<(String, f32)> {
    let mut seen = HashSet::new();
    let mut ranked = Vec::with_capacity(k);

    for hit in hits {
        if let Some(allowed) = allowed {
            if !allowed.contains(&hit.article_fingerprint) {
                continue;
            }
        }
        if seen.insert(hit.article_fingerprint.clone()) {
            ranked.push((hit.article_fingerprint.clone(), hit.distance));
            if ranked.len() == k {
                break;
            }
        }
    }

    ranked
}
