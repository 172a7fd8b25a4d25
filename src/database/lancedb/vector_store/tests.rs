use super::*;
use tempfile::TempDir;

const DIM: usize = 4;

fn record(id: &str, fingerprint: &str, chunk_index: u32, vector: Vec<f32>) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        vector,
        article_fingerprint: fingerprint.to_string(),
        chunk_index,
        content: format!("chunk {chunk_index} of {fingerprint}"),
        domain: Some("news.example.com".to_string()),
        published_at: Some("2025-05-01".to_string()),
        tags: Some("ai".to_string()),
        created_at: "2025-05-02T00:00:00Z".to_string(),
    }
}

async fn open_index(dir: &TempDir) -> VectorIndex {
    VectorIndex::open(dir.path().join("vectors"), DistanceMetric::Cosine, DIM)
        .await
        .expect("open index")
}

#[tokio::test]
async fn open_writes_sidecar_metadata() {
    let dir = TempDir::new().expect("tempdir");
    let _index = open_index(&dir).await;
    assert!(dir.path().join("vectors/index.meta.toml").exists());
}

#[tokio::test]
async fn reopening_with_a_different_metric_fails() {
    let dir = TempDir::new().expect("tempdir");
    let _index = open_index(&dir).await;

    let err = VectorIndex::open(dir.path().join("vectors"), DistanceMetric::L2, DIM)
        .await
        .expect_err("metric mismatch");
    assert!(matches!(err, BriefcastError::IndexMetricMismatch { .. }));
}

#[tokio::test]
async fn reopening_with_a_different_dimension_fails() {
    let dir = TempDir::new().expect("tempdir");
    let _index = open_index(&dir).await;

    let err = VectorIndex::open(dir.path().join("vectors"), DistanceMetric::Cosine, DIM + 1)
        .await
        .expect_err("dimension mismatch");
    assert!(matches!(err, BriefcastError::Database(_)));
}

#[tokio::test]
async fn query_returns_nearest_chunks_sorted_by_distance() {
    let dir = TempDir::new().expect("tempdir");
    let index = open_index(&dir).await;

    index
        .upsert_article(
            "fp-a",
            &[
                record("a0", "fp-a", 0, vec![1.0, 0.0, 0.0, 0.0]),
                record("a1", "fp-a", 1, vec![0.0, 1.0, 0.0, 0.0]),
            ],
        )
        .await
        .expect("upsert");

    let hits = index
        .query(&[1.0, 0.0, 0.0, 0.0], 2, None)
        .await
        .expect("query");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_index, 0);
    assert!(hits[0].distance <= hits[1].distance);
    assert!(hits[0].distance.abs() < 1e-5);
    assert_eq!(hits[0].domain.as_deref(), Some("news.example.com"));
}

#[tokio::test]
async fn upsert_replaces_an_articles_vectors_wholesale() {
    let dir = TempDir::new().expect("tempdir");
    let index = open_index(&dir).await;

    index
        .upsert_article(
            "fp-a",
            &[
                record("a0", "fp-a", 0, vec![1.0, 0.0, 0.0, 0.0]),
                record("a1", "fp-a", 1, vec![0.0, 1.0, 0.0, 0.0]),
            ],
        )
        .await
        .expect("first upsert");

    index
        .upsert_article("fp-a", &[record("a2", "fp-a", 0, vec![0.0, 0.0, 1.0, 0.0])])
        .await
        .expect("second upsert");

    assert_eq!(index.count_for_article("fp-a").await.expect("count"), 1);
    let hits = index
        .query(&[0.0, 0.0, 1.0, 0.0], 10, None)
        .await
        .expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "chunk 0 of fp-a");
}

#[tokio::test]
async fn empty_upsert_clears_the_article() {
    let dir = TempDir::new().expect("tempdir");
    let index = open_index(&dir).await;

    index
        .upsert_article("fp-a", &[record("a0", "fp-a", 0, vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .expect("upsert");
    index.upsert_article("fp-a", &[]).await.expect("clear");

    assert_eq!(index.count_for_article("fp-a").await.expect("count"), 0);
    assert_eq!(index.count_all().await.expect("count"), 0);
}

#[tokio::test]
async fn filter_predicate_narrows_results() {
    let dir = TempDir::new().expect("tempdir");
    let index = open_index(&dir).await;

    index
        .upsert_article("fp-a", &[record("a0", "fp-a", 0, vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .expect("upsert a");
    index
        .upsert_article("fp-b", &[record("b0", "fp-b", 0, vec![0.9, 0.1, 0.0, 0.0])])
        .await
        .expect("upsert b");

    let hits = index
        .query(
            &[1.0, 0.0, 0.0, 0.0],
            10,
            Some("article_fingerprint = 'fp-b'"),
        )
        .await
        .expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].article_fingerprint, "fp-b");
}

#[tokio::test]
async fn mismatched_record_dimension_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let index = open_index(&dir).await;

    let err = index
        .upsert_article("fp-a", &[record("a0", "fp-a", 0, vec![1.0, 0.0])])
        .await
        .expect_err("dimension mismatch");
    assert!(matches!(err, BriefcastError::Database(_)));
}
