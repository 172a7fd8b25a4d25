
use anyhow::Context;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use super::models::{join_list, ArticleCriteria, ArticleRow, ChunkRow, NewChunkRow};
use crate::article::Article;
use crate::{BriefcastError, Result};

const ARTICLE_COLUMNS: &str = "fingerprint, url, title, body, domain, published_at, \
                               description, keywords, language, summary, vectorized, \
                               created_date, updated_date";

pub struct ArticleQueries;

impl ArticleQueries {
    /// Insert a new article together with its tag and author bridge rows.
    ///
    /// A fingerprint or URL collision surfaces as
    /// [`BriefcastError::DuplicateArticle`] so callers can apply their
    /// duplicate policy instead of treating it as a storage fault.
    pub async fn create(pool: &SqlitePool, article: &Article) -> Result<()> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin article insert transaction")?;

        let now = Utc::now().naive_utc();
        let keywords = join_list(&article.keywords);
        let result = sqlx::query(
            r#"
            INSERT INTO articles
                (fingerprint, url, title, body, domain, published_at, description,
                 keywords, language, summary, vectorized, created_date, updated_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&article.fingerprint)
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.body)
        .bind(&article.domain)
        .bind(article.published_at)
        .bind(&article.description)
        .bind(&keywords)
        .bind(&article.language)
        .bind(&article.summary)
        .bind(now)
        .bind(now)
        .execute(&mut *transaction)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(BriefcastError::DuplicateArticle(article.fingerprint.clone()));
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to insert article").into()),
        }

        Self::insert_bridges(&mut transaction, article).await?;

        transaction
            .commit()
            .await
            .context("Failed to commit article insert transaction")?;

        debug!("created article {}", article.fingerprint);
        Ok(())
    }

    /// Replace an existing row in place, clearing its vectorized flag so the
    /// next pipeline run re-indexes it. Bridge rows are rewritten wholesale.
    pub async fn update(pool: &SqlitePool, article: &Article) -> Result<()> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin article update transaction")?;

        let now = Utc::now().naive_utc();
        let keywords = join_list(&article.keywords);
        let rows_affected = sqlx::query(
            r#"
            UPDATE articles
            SET url = ?, title = ?, body = ?, domain = ?, published_at = ?,
                description = ?, keywords = ?, language = ?, summary = ?,
                vectorized = 0, updated_date = ?
            WHERE fingerprint = ?
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.body)
        .bind(&article.domain)
        .bind(article.published_at)
        .bind(&article.description)
        .bind(&keywords)
        .bind(&article.language)
        .bind(&article.summary)
        .bind(now)
        .bind(&article.fingerprint)
        .execute(&mut *transaction)
        .await
        .context("Failed to update article")?
        .rows_affected();

        if rows_affected == 0 {
            return Err(BriefcastError::ArticleNotFound(article.fingerprint.clone()));
        }

        Self::delete_bridges(&mut transaction, &article.fingerprint).await?;
        Self::insert_bridges(&mut transaction, article).await?;

        transaction
            .commit()
            .await
            .context("Failed to commit article update transaction")?;

        debug!("updated article {}", article.fingerprint);
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, fingerprint: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE fingerprint = ?")
            .bind(fingerprint)
            .execute(pool)
            .await
            .context("Failed to delete article")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_by_fingerprint(
        pool: &SqlitePool,
        fingerprint: &str,
    ) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE fingerprint = ?"
        ))
        .bind(fingerprint)
        .fetch_optional(pool)
        .await
        .context("Failed to get article by fingerprint")?;

        match row {
            Some(row) => Ok(Some(Self::hydrate(pool, row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created_date DESC"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

        Self::hydrate_all(pool, rows).await
    }

    /// Articles still waiting for vectorization, oldest first.
    pub async fn list_pending(pool: &SqlitePool) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE vectorized = 0 ORDER BY created_date ASC"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list pending articles")?;

        Self::hydrate_all(pool, rows).await
    }

    /// Conjunctive metadata filter. Every present criterion narrows the
    /// result; an empty criteria set behaves like `list_all`.
    pub async fn find_by_criteria(
        pool: &SqlitePool,
        criteria: &ArticleCriteria,
    ) -> Result<Vec<Article>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE 1 = 1"));

        if let Some(domain) = &criteria.domain {
            builder.push(" AND domain = ").push_bind(domain);
        }
        if let Some(tag) = &criteria.tag {
            builder
                .push(" AND fingerprint IN (SELECT article_fingerprint FROM article_tags WHERE tag = ")
                .push_bind(tag)
                .push(")");
        }
        if let Some(after) = criteria.published_after {
            builder
                .push(" AND published_at IS NOT NULL AND published_at >= ")
                .push_bind(after);
        }
        if let Some(before) = criteria.published_before {
            builder
                .push(" AND published_at IS NOT NULL AND published_at <= ")
                .push_bind(before);
        }
        if let Some(vectorized) = criteria.vectorized {
            builder.push(" AND vectorized = ").push_bind(vectorized);
        }

        builder.push(" ORDER BY created_date DESC");

        let rows = builder
            .build_query_as::<ArticleRow>()
            .fetch_all(pool)
            .await
            .context("Failed to find articles by criteria")?;

        Self::hydrate_all(pool, rows).await
    }

    /// Flip the vectorized flag, but only from the unvectorized state. The
    /// compare-and-set keeps concurrent pipeline workers from double-counting
    /// an article. Returns whether this call performed the flip.
    pub async fn mark_vectorized(pool: &SqlitePool, fingerprint: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE articles SET vectorized = 1, updated_date = ? \
             WHERE fingerprint = ? AND vectorized = 0",
        )
        .bind(Utc::now().naive_utc())
        .bind(fingerprint)
        .execute(pool)
        .await
        .context("Failed to mark article vectorized")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_vectorized(pool: &SqlitePool, fingerprint: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE articles SET vectorized = 0, updated_date = ? WHERE fingerprint = ?",
        )
        .bind(Utc::now().naive_utc())
        .bind(fingerprint)
        .execute(pool)
        .await
        .context("Failed to clear vectorized flag")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_vectorized(pool: &SqlitePool, fingerprint: &str) -> Result<bool> {
        let vectorized =
            sqlx::query_scalar::<_, bool>("SELECT vectorized FROM articles WHERE fingerprint = ?")
                .bind(fingerprint)
                .fetch_optional(pool)
                .await
                .context("Failed to read vectorized flag")?;

        vectorized.ok_or_else(|| BriefcastError::ArticleNotFound(fingerprint.to_string()))
    }

    pub async fn set_summary(pool: &SqlitePool, fingerprint: &str, summary: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE articles SET summary = ?, updated_date = ? WHERE fingerprint = ?",
        )
        .bind(summary)
        .bind(Utc::now().naive_utc())
        .bind(fingerprint)
        .execute(pool)
        .await
        .context("Failed to set article summary")?;

        if result.rows_affected() == 0 {
            return Err(BriefcastError::ArticleNotFound(fingerprint.to_string()));
        }
        Ok(())
    }

    pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles")
            .fetch_one(pool)
            .await
            .context("Failed to count articles")?;
        Ok(count)
    }

    pub async fn count_vectorized(pool: &SqlitePool) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles WHERE vectorized = 1")
                .fetch_one(pool)
                .await
                .context("Failed to count vectorized articles")?;
        Ok(count)
    }

    async fn insert_bridges(
        transaction: &mut sqlx::Transaction<'_, Sqlite>,
        article: &Article,
    ) -> Result<()> {
        for tag in &article.tags {
            sqlx::query("INSERT INTO article_tags (article_fingerprint, tag) VALUES (?, ?)")
                .bind(&article.fingerprint)
                .bind(tag)
                .execute(&mut **transaction)
                .await
                .context("Failed to insert article tag")?;
        }

        for author in &article.authors {
            sqlx::query("INSERT INTO article_authors (article_fingerprint, author) VALUES (?, ?)")
                .bind(&article.fingerprint)
                .bind(author)
                .execute(&mut **transaction)
                .await
                .context("Failed to insert article author")?;
        }

        Ok(())
    }

    async fn delete_bridges(
        transaction: &mut sqlx::Transaction<'_, Sqlite>,
        fingerprint: &str,
    ) -> Result<()> {
        sqlx::query("DELETE FROM article_tags WHERE article_fingerprint = ?")
            .bind(fingerprint)
            .execute(&mut **transaction)
            .await
            .context("Failed to delete article tags")?;

        sqlx::query("DELETE FROM article_authors WHERE article_fingerprint = ?")
            .bind(fingerprint)
            .execute(&mut **transaction)
            .await
            .context("Failed to delete article authors")?;

        Ok(())
    }

    async fn hydrate(pool: &SqlitePool, row: ArticleRow) -> Result<Article> {
        let authors = sqlx::query_scalar::<_, String>(
            "SELECT author FROM article_authors WHERE article_fingerprint = ? ORDER BY id",
        )
        .bind(&row.fingerprint)
        .fetch_all(pool)
        .await
        .context("Failed to load article authors")?;

        let tags = sqlx::query_scalar::<_, String>(
            "SELECT tag FROM article_tags WHERE article_fingerprint = ? ORDER BY id",
        )
        .bind(&row.fingerprint)
        .fetch_all(pool)
        .await
        .context("Failed to load article tags")?;

        Ok(row.into_article(authors, tags))
    }

    async fn hydrate_all(pool: &SqlitePool, rows: Vec<ArticleRow>) -> Result<Vec<Article>> {
        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            articles.push(Self::hydrate(pool, row).await?);
        }
        Ok(articles)
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    /// Replace the chunk mirror for one article in a single transaction so
    /// readers never observe a mix of old and new chunks.
    pub async fn replace_for_article(
        pool: &SqlitePool,
        fingerprint: &str,
        chunks: &[NewChunkRow],
    ) -> Result<()> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin chunk replace transaction")?;

        sqlx::query("DELETE FROM article_chunks WHERE article_fingerprint = ?")
            .bind(fingerprint)
            .execute(&mut *transaction)
            .await
            .context("Failed to delete old chunks")?;

        let now = Utc::now().naive_utc();
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO article_chunks
                    (article_fingerprint, chunk_index, content, vector_id, created_date)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.article_fingerprint)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.vector_id)
            .bind(now)
            .execute(&mut *transaction)
            .await
            .context("Failed to insert chunk")?;
        }

        transaction
            .commit()
            .await
            .context("Failed to commit chunk replace transaction")?;

        debug!("mirrored {} chunk(s) for article {fingerprint}", chunks.len());
        Ok(())
    }

    pub async fn list_for_article(pool: &SqlitePool, fingerprint: &str) -> Result<Vec<ChunkRow>> {
        let chunks = sqlx::query_as::<_, ChunkRow>(
            "SELECT id, article_fingerprint, chunk_index, content, vector_id, created_date \
             FROM article_chunks WHERE article_fingerprint = ? ORDER BY chunk_index",
        )
        .bind(fingerprint)
        .fetch_all(pool)
        .await
        .context("Failed to list chunks for article")?;

        Ok(chunks)
    }

    pub async fn count_for_article(pool: &SqlitePool, fingerprint: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM article_chunks WHERE article_fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_one(pool)
        .await
        .context("Failed to count chunks for article")?;

        Ok(count)
    }

    pub async fn delete_for_article(pool: &SqlitePool, fingerprint: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM article_chunks WHERE article_fingerprint = ?")
            .bind(fingerprint)
            .execute(pool)
            .await
            .context("Failed to delete chunks for article")?;

        Ok(result.rows_affected() as usize)
    }

    pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM article_chunks")
            .fetch_one(pool)
            .await
            .context("Failed to count chunks")?;
        Ok(count)
    }
}
