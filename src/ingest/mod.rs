
use std::str::FromStr;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

use crate::article::Article;
use crate::database::sqlite::Database;
use crate::{BriefcastError, Result};

/// Known crawler payload shapes. Each variant has exactly one parser; an
/// unrecognized source tag fails fast instead of guessing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Apify article-scraper output (`loadedDomain`, `lang`, `author[]`, ...).
    Apify,
    /// Plain `{url, title, body, ...}` payloads.
    Generic,
}

impl FromStr for SourceKind {
    type Err = BriefcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "apify" => Ok(SourceKind::Apify),
            "generic" => Ok(SourceKind::Generic),
            other => Err(BriefcastError::MalformedPayload(format!(
                "unknown payload source '{other}' (expected 'apify' or 'generic')"
            ))),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            SourceKind::Apify => write!(f, "apify"),
            SourceKind::Generic => write!(f, "generic"),
        }
    }
}

/// What to do when an incoming payload fingerprints to an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// First write wins; the duplicate is reported per item.
    #[default]
    Skip,
    /// Replace the stored row in place and clear its vectorized flag so the
    /// next pipeline run re-chunks and wholesale re-indexes it.
    Overwrite,
}

/// Per-item outcome of a batch ingest. A failed item never aborts the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub stored: Vec<String>,
    pub overwritten: Vec<String>,
    pub duplicates: Vec<String>,
    pub failures: Vec<IngestFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    /// Position of the payload within the submitted batch.
    pub index: usize,
    pub reason: String,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.stored.len() + self.overwritten.len() + self.duplicates.len() + self.failures.len()
    }
}

/// Turn a raw crawler payload into a transient [`Article`].
///
/// Pure: no persistence happens here. The URL and body text are required;
/// every other field is optional and defaults to empty. The fingerprint is
/// derived from the canonical URL before any other extraction.
pub fn transform(source: SourceKind, payload: &Value) -> Result<Article> {
    match source {
        SourceKind::Apify => transform_apify(payload),
        SourceKind::Generic => transform_generic(payload),
    }
}

fn transform_apify(payload: &Value) -> Result<Article> {
    let url = required_str(payload, "url")?;
    let body = required_str(payload, "text")?;
    let title = optional_str(payload, "title").unwrap_or_default();

    let mut article = Article::new(url, title, body)?;

    if let Some(domain) = optional_str(payload, "loadedDomain") {
        article.domain = Some(domain.to_lowercase());
    }
    article.published_at = optional_str(payload, "date").and_then(parse_date);
    article.authors = string_list(payload, "author");
    article.description = optional_str(payload, "description");
    article.keywords = comma_list(payload, "keywords");
    article.language = optional_str(payload, "lang");
    article.tags = string_list(payload, "tags");

    Ok(article)
}

fn transform_generic(payload: &Value) -> Result<Article> {
    let url = required_str(payload, "url")?;
    let body = required_str(payload, "body")?;
    let title = optional_str(payload, "title").unwrap_or_default();

    let mut article = Article::new(url, title, body)?;

    if let Some(domain) = optional_str(payload, "domain") {
        article.domain = Some(domain.to_lowercase());
    }
    article.published_at = optional_str(payload, "published_at").and_then(parse_date);
    article.authors = string_list(payload, "authors");
    article.description = optional_str(payload, "description");
    article.keywords = string_list(payload, "keywords");
    article.language = optional_str(payload, "language");
    article.tags = string_list(payload, "tags");
    // Summaries are produced by an external collaborator and arrive with the
    // payload when present.
    article.summary = optional_str(payload, "summary");

    Ok(article)
}

fn required_str<'a>(payload: &'a Value, key: &str) -> Result<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            BriefcastError::MalformedPayload(format!("missing required field '{key}'"))
        })
}

fn optional_str(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Accepts either a JSON array of strings or a single string.
fn string_list(payload: &Value, key: &str) -> Vec<String> {
    match payload.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_owned()],
        _ => Vec::new(),
    }
}

/// Apify serializes keywords as one comma-joined string.
fn comma_list(payload: &Value, key: &str) -> Vec<String> {
    match payload.get(key) {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => string_list(payload, key),
    }
}

/// Dates arrive as `YYYY-MM-DD` or an RFC 3339 timestamp; only the date part
/// is kept. Unparseable dates are dropped rather than failing the payload.
fn parse_date(raw: String) -> Option<NaiveDate> {
    let date_part = raw.get(..10).unwrap_or(raw.as_str());
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Transform and persist a batch of payloads, reporting per-item outcomes.
pub async fn ingest_batch(
    database: &Database,
    source: SourceKind,
    payloads: &[Value],
    policy: DuplicatePolicy,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for (index, payload) in payloads.iter().enumerate() {
        let article = match transform(source, payload) {
            Ok(article) => article,
            Err(e) => {
                warn!("skipping payload {index}: {e}");
                report.failures.push(IngestFailure {
                    index,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let fingerprint = article.fingerprint.clone();
        match database.save(&article).await {
            Ok(()) => {
                debug!("stored article {fingerprint}");
                report.stored.push(fingerprint);
            }
            Err(BriefcastError::DuplicateArticle(_)) => match policy {
                DuplicatePolicy::Skip => {
                    debug!("duplicate article {fingerprint}, skipping");
                    report.duplicates.push(fingerprint);
                }
                DuplicatePolicy::Overwrite => {
                    database.overwrite(&article).await?;
                    debug!("overwrote article {fingerprint}, re-vectorization pending");
                    report.overwritten.push(fingerprint);
                }
            },
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}
