pub mod models;
pub mod queries;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::article::Article;
use crate::Result;
use models::{ArticleCriteria, ChunkRow, NewChunkRow};
use queries::{ArticleQueries, ChunkQueries};

/// Article metadata store backed by SQLite. Vector payloads live in the
/// LanceDB index; this database owns everything else, including the
/// vectorized flag and the chunk mirror.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database at `path` and ensure the
    /// schema exists.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            path.as_ref().display()
        ))
        .context("Invalid database path")?
        .create_if_missing(true)
        .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let database = Self { pool };
        database.initialize_schema().await?;

        info!("opened metadata database at {}", path.as_ref().display());
        Ok(database)
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid in-memory database options")?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        let database = Self { pool };
        database.initialize_schema().await?;
        Ok(database)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                fingerprint  TEXT PRIMARY KEY NOT NULL,
                url          TEXT NOT NULL UNIQUE,
                title        TEXT NOT NULL,
                body         TEXT NOT NULL,
                domain       TEXT,
                published_at TEXT,
                description  TEXT,
                keywords     TEXT,
                language     TEXT,
                summary      TEXT,
                vectorized   BOOLEAN NOT NULL DEFAULT 0,
                created_date DATETIME NOT NULL,
                updated_date DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create articles table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_tags (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                article_fingerprint TEXT NOT NULL
                    REFERENCES articles(fingerprint) ON DELETE CASCADE,
                tag                 TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create article_tags table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_authors (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                article_fingerprint TEXT NOT NULL
                    REFERENCES articles(fingerprint) ON DELETE CASCADE,
                author              TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create article_authors table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_chunks (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                article_fingerprint TEXT NOT NULL
                    REFERENCES articles(fingerprint) ON DELETE CASCADE,
                chunk_index         INTEGER NOT NULL,
                content             TEXT NOT NULL,
                vector_id           TEXT NOT NULL,
                created_date        DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create article_chunks table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_vectorized ON articles(vectorized)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create vectorized index")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_article_tags_tag ON article_tags(tag)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create tag index")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_article_chunks_fingerprint \
             ON article_chunks(article_fingerprint)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create chunk index")?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn save(&self, article: &Article) -> Result<()> {
        ArticleQueries::create(&self.pool, article).await
    }

    /// Save a batch, one transaction per article. Earlier commits survive
    /// later failures; the per-entry outcome tells callers which did.
    pub async fn save_all(&self, articles: &[Article]) -> Vec<(String, Result<()>)> {
        let mut outcomes = Vec::with_capacity(articles.len());
        for article in articles {
            let result = self.save(article).await;
            outcomes.push((article.fingerprint.clone(), result));
        }
        outcomes
    }

    /// Replace an existing article in place. The vectorized flag is cleared
    /// and stale chunk mirror rows are dropped so the next pipeline run
    /// rebuilds them.
    pub async fn overwrite(&self, article: &Article) -> Result<()> {
        ArticleQueries::update(&self.pool, article).await?;
        ChunkQueries::delete_for_article(&self.pool, &article.fingerprint).await?;
        Ok(())
    }

    pub async fn delete(&self, fingerprint: &str) -> Result<bool> {
        ArticleQueries::delete(&self.pool, fingerprint).await
    }

    pub async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Article>> {
        ArticleQueries::get_by_fingerprint(&self.pool, fingerprint).await
    }

    pub async fn find_all(&self) -> Result<Vec<Article>> {
        ArticleQueries::list_all(&self.pool).await
    }

    pub async fn find_pending(&self) -> Result<Vec<Article>> {
        ArticleQueries::list_pending(&self.pool).await
    }

    pub async fn find_by_criteria(&self, criteria: &ArticleCriteria) -> Result<Vec<Article>> {
        ArticleQueries::find_by_criteria(&self.pool, criteria).await
    }

    pub async fn mark_vectorized(&self, fingerprint: &str) -> Result<bool> {
        ArticleQueries::mark_vectorized(&self.pool, fingerprint).await
    }

    pub async fn clear_vectorized(&self, fingerprint: &str) -> Result<bool> {
        ArticleQueries::clear_vectorized(&self.pool, fingerprint).await
    }

    pub async fn is_vectorized(&self, fingerprint: &str) -> Result<bool> {
        ArticleQueries::is_vectorized(&self.pool, fingerprint).await
    }

    pub async fn set_summary(&self, fingerprint: &str, summary: &str) -> Result<()> {
        ArticleQueries::set_summary(&self.pool, fingerprint, summary).await
    }

    pub async fn replace_chunks(&self, fingerprint: &str, chunks: &[NewChunkRow]) -> Result<()> {
        ChunkQueries::replace_for_article(&self.pool, fingerprint, chunks).await
    }

    pub async fn chunks_for_article(&self, fingerprint: &str) -> Result<Vec<ChunkRow>> {
        ChunkQueries::list_for_article(&self.pool, fingerprint).await
    }

    pub async fn chunk_count(&self, fingerprint: &str) -> Result<i64> {
        ChunkQueries::count_for_article(&self.pool, fingerprint).await
    }

    pub async fn article_count(&self) -> Result<i64> {
        ArticleQueries::count_all(&self.pool).await
    }

    pub async fn vectorized_count(&self) -> Result<i64> {
        ArticleQueries::count_vectorized(&self.pool).await
    }

    pub async fn total_chunk_count(&self) -> Result<i64> {
        ChunkQueries::count_all(&self.pool).await
    }
}
