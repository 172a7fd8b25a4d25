
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::FromRow;

use crate::article::Article;

/// Raw `articles` row. Tags and authors live in bridge tables and are
/// hydrated separately; keywords are stored comma-joined in the row itself.
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRow {
    pub fingerprint: String,
    pub url: String,
    pub title: String,
    pub body: String,
    pub domain: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub language: Option<String>,
    pub summary: Option<String>,
    pub vectorized: bool,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
}

impl ArticleRow {
    /// Assemble a domain [`Article`] from the row plus its hydrated bridge
    /// table values.
    pub fn into_article(self, authors: Vec<String>, tags: Vec<String>) -> Article {
        Article {
            fingerprint: self.fingerprint,
            url: self.url,
            title: self.title,
            body: self.body,
            domain: self.domain,
            published_at: self.published_at,
            authors,
            description: self.description,
            keywords: split_joined(self.keywords.as_deref()),
            language: self.language,
            tags,
            summary: self.summary,
            vectorized: self.vectorized,
        }
    }
}

/// Comma-join a list for column storage. Empty lists store as NULL.
pub fn join_list(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(items.join(","))
    }
}

pub fn split_joined(joined: Option<&str>) -> Vec<String> {
    joined
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Row of the `article_chunks` mirror table. The authoritative copy of each
/// chunk lives in the vector index; this mirror backs chunk retrieval and the
/// consistency check without a vector round trip.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub id: i64,
    pub article_fingerprint: String,
    pub chunk_index: i64,
    pub content: String,
    pub vector_id: String,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewChunkRow {
    pub article_fingerprint: String,
    pub chunk_index: i64,
    pub content: String,
    pub vector_id: String,
}

/// Metadata predicates for filtered lookups. All present fields must match
/// (conjunctive); an empty criteria set matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleCriteria {
    pub domain: Option<String>,
    pub tag: Option<String>,
    pub published_after: Option<NaiveDate>,
    pub published_before: Option<NaiveDate>,
    pub vectorized: Option<bool>,
}

impl ArticleCriteria {
    pub fn is_empty(&self) -> bool {
        self.domain.is_none()
            && self.tag.is_none()
            && self.published_after.is_none()
            && self.published_before.is_none()
            && self.vectorized.is_none()
    }

    /// In-memory mirror of the SQL predicates, used to post-filter vector
    /// hits without another database round trip.
    pub fn matches(&self, article: &Article) -> bool {
        if let Some(domain) = &self.domain {
            if article.domain.as_deref() != Some(domain.as_str()) {
                return false;
            }
        }

        if let Some(tag) = &self.tag {
            if !article.tags.iter().any(|t| t == tag) {
                return false;
            }
        }

        if let Some(after) = self.published_after {
            match article.published_at {
                Some(date) if date >= after => {}
                _ => return false,
            }
        }

        if let Some(before) = self.published_before {
            match article.published_at {
                Some(date) if date <= before => {}
                _ => return false,
            }
        }

        if let Some(vectorized) = self.vectorized {
            if article.vectorized != vectorized {
                return false;
            }
        }

        true
    }
}
