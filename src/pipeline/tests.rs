use super::*;
use crate::embeddings::EmbeddingError;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

const DIM: usize = 4;

/// Deterministic stand-in for a real embedding backend.
struct StubEmbedder;

fn stub_vector(text: &str) -> Vec<f32> {
    let seed: u32 = text.bytes().map(u32::from).sum();
    (0..DIM)
        .map(|i| ((seed.wrapping_mul(i as u32 + 1) % 97) as f32) / 97.0)
        .collect()
}

impl EmbeddingBackend for StubEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        Ok(stub_vector(text))
    }

    fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| stub_vector(t)).collect())
    }
}

/// Fails with a retryable error a fixed number of times, then succeeds.
struct FlakyEmbedder {
    failures_left: AtomicU32,
}

impl EmbeddingBackend for FlakyEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(std::slice::from_ref(&text.to_string()))
            .map(|mut v| v.remove(0))
    }

    fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EmbeddingError::Unavailable("transient outage".to_string()));
        }
        Ok(texts.iter().map(|t| stub_vector(t)).collect())
    }
}

struct Harness {
    _dir: TempDir,
    database: Database,
    vectorizer: Vectorizer,
}

async fn harness(embedder: Arc<dyn EmbeddingBackend>, retry_attempts: u32) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let database = Database::in_memory().await.expect("database");
    let index = VectorIndex::open(
        dir.path().join("vectors"),
        crate::database::lancedb::DistanceMetric::Cosine,
        DIM,
    )
    .await
    .expect("index");

    let vectorizer = Vectorizer::new(
        database.clone(),
        Arc::new(tokio::sync::Mutex::new(index)),
        embedder,
        ChunkingConfig::default(),
        PipelineConfig {
            max_concurrency: 2,
            retry_attempts,
            backoff_base_ms: 1,
        },
    );

    Harness {
        _dir: dir,
        database,
        vectorizer,
    }
}

fn article(url: &str, body: &str) -> Article {
    let mut article = Article::new(url, "Title", body).expect("valid article");
    article.tags = vec!["ai".to_string()];
    article
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_article_is_chunked_embedded_and_flagged() {
    let h = harness(Arc::new(StubEmbedder), 3).await;
    let a = article("https://a.example/1", "A short body to vectorize.");
    h.database.save(&a).await.expect("save");

    let report = h.vectorizer.process_pending().await.expect("run");
    assert_eq!(report.processed, vec![a.fingerprint.clone()]);
    assert_eq!(report.chunks_indexed, 1);
    assert!(report.failures.is_empty());

    assert!(h.database.is_vectorized(&a.fingerprint).await.expect("flag"));
    assert_eq!(h.database.chunk_count(&a.fingerprint).await.expect("mirror"), 1);

    let consistency = h.vectorizer.verify_consistency().await.expect("verify");
    assert_eq!(consistency.checked, 1);
    assert!(consistency.is_consistent());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_body_vectorizes_trivially() {
    let h = harness(Arc::new(StubEmbedder), 3).await;
    let mut a = article("https://a.example/1", "placeholder");
    a.body = String::new();
    h.database.save(&a).await.expect("save");

    let report = h.vectorizer.process_pending().await.expect("run");
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.chunks_indexed, 0);
    assert!(h.database.is_vectorized(&a.fingerprint).await.expect("flag"));
    assert_eq!(h.database.chunk_count(&a.fingerprint).await.expect("mirror"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_embedding_failures_are_retried() {
    let embedder = Arc::new(FlakyEmbedder {
        failures_left: AtomicU32::new(3),
    });
    let h = harness(embedder, 4).await;
    let a = article("https://a.example/1", "Body that embeds on the fourth try.");
    h.database.save(&a).await.expect("save");

    let report = h.vectorizer.process_pending().await.expect("run");
    assert_eq!(report.processed.len(), 1);
    assert!(report.failures.is_empty());
    assert!(h.database.is_vectorized(&a.fingerprint).await.expect("flag"));
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_leave_the_article_pending() {
    let embedder = Arc::new(FlakyEmbedder {
        failures_left: AtomicU32::new(u32::MAX),
    });
    let h = harness(embedder, 2).await;
    let a = article("https://a.example/1", "Body that never embeds.");
    h.database.save(&a).await.expect("save");

    let report = h.vectorizer.process_pending().await.expect("run");
    assert!(report.processed.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].fingerprint, a.fingerprint);

    // Still pending, nothing half-indexed.
    assert!(!h.database.is_vectorized(&a.fingerprint).await.expect("flag"));
    assert_eq!(h.database.chunk_count(&a.fingerprint).await.expect("mirror"), 0);
    assert_eq!(h.database.find_pending().await.expect("pending").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn already_vectorized_articles_are_skipped() {
    let h = harness(Arc::new(StubEmbedder), 3).await;
    let a = article("https://a.example/1", "Body.");
    h.database.save(&a).await.expect("save");

    let first = h.vectorizer.process_pending().await.expect("first run");
    assert_eq!(first.processed.len(), 1);

    // Nothing pending, so the second run is a no-op.
    let second = h.vectorizer.process_pending().await.expect("second run");
    assert!(second.processed.is_empty());
    assert!(second.failures.is_empty());

    let reloaded = h
        .database
        .find_by_fingerprint(&a.fingerprint)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(
        h.vectorizer.process_article(reloaded).await.expect("direct"),
        ArticleOutcome::Skipped
    );
}
