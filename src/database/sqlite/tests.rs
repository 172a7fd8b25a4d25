use super::*;
use tempfile::TempDir;

fn article(url: &str) -> Article {
    Article::new(url, "Title", "Body text for storage.").expect("valid article")
}

#[tokio::test]
async fn schema_initialization_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("metadata.db");

    let first = Database::new(&path).await.expect("first open");
    first.save(&article("https://a.example/1")).await.expect("save");
    drop(first);

    // Reopening must not clobber existing rows.
    let second = Database::new(&path).await.expect("second open");
    assert_eq!(second.article_count().await.expect("count"), 1);
}

#[tokio::test]
async fn save_rejects_duplicates_and_overwrite_replaces() {
    let db = Database::in_memory().await.expect("database");
    let mut stored = article("https://a.example/1");
    db.save(&stored).await.expect("save");

    let err = db.save(&stored).await.expect_err("duplicate");
    assert!(matches!(err, crate::BriefcastError::DuplicateArticle(_)));

    stored.body = "Refreshed body.".to_string();
    db.overwrite(&stored).await.expect("overwrite");

    let loaded = db
        .find_by_fingerprint(&stored.fingerprint)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(loaded.body, "Refreshed body.");
    assert!(!loaded.vectorized);
    assert_eq!(db.article_count().await.expect("count"), 1);
}

#[tokio::test]
async fn overwrite_drops_stale_chunk_mirror() {
    let db = Database::in_memory().await.expect("database");
    let stored = article("https://a.example/1");
    db.save(&stored).await.expect("save");
    db.replace_chunks(
        &stored.fingerprint,
        &[models::NewChunkRow {
            article_fingerprint: stored.fingerprint.clone(),
            chunk_index: 0,
            content: "chunk".to_string(),
            vector_id: "v0".to_string(),
        }],
    )
    .await
    .expect("chunks");

    db.overwrite(&stored).await.expect("overwrite");
    assert_eq!(db.chunk_count(&stored.fingerprint).await.expect("count"), 0);
}

#[tokio::test]
async fn batch_save_keeps_earlier_rows_on_later_failure() {
    let db = Database::in_memory().await.expect("database");
    let a = article("https://a.example/1");
    let b = article("https://a.example/2");
    db.save(&b).await.expect("pre-existing row");

    let outcomes = db.save_all(&[a.clone(), b.clone()]).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].1.is_ok());
    assert!(matches!(
        outcomes[1].1,
        Err(crate::BriefcastError::DuplicateArticle(_))
    ));

    // The first article committed despite the second one failing.
    assert_eq!(db.article_count().await.expect("count"), 2);
}

#[tokio::test]
async fn pending_lists_only_unvectorized_articles() {
    let db = Database::in_memory().await.expect("database");
    let a = article("https://a.example/1");
    let b = article("https://a.example/2");
    db.save(&a).await.expect("save a");
    db.save(&b).await.expect("save b");

    assert!(db.mark_vectorized(&a.fingerprint).await.expect("mark"));

    let pending = db.find_pending().await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].fingerprint, b.fingerprint);
    assert_eq!(db.vectorized_count().await.expect("count"), 1);
}
