
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::{BriefcastError, Result};

/// Canonical in-memory representation of a scraped article.
///
/// Identity is the `fingerprint`: a deterministic hash of the canonical URL,
/// used as the dedup key everywhere downstream. The metadata store owns
/// persisted articles; the ingestion transformer only builds transient values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub fingerprint: String,
    pub url: String,
    pub title: String,
    pub body: String,
    pub domain: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub language: Option<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub vectorized: bool,
}

impl Article {
    /// Build a new, unvectorized article from its required fields.
    ///
    /// The fingerprint is computed from the canonical form of `url` before
    /// anything else; the canonical URL is what gets stored.
    pub fn new(url: &str, title: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        let canonical = canonicalize_url(url)?;
        let fingerprint = fingerprint_url(&canonical);
        let domain = Url::parse(&canonical)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned));

        Ok(Self {
            fingerprint,
            url: canonical,
            title: title.into(),
            body: body.into(),
            domain,
            published_at: None,
            authors: Vec::new(),
            description: None,
            keywords: Vec::new(),
            language: None,
            tags: Vec::new(),
            summary: None,
            vectorized: false,
        })
    }

    pub fn has_summary(&self) -> bool {
        self.summary.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Normalize a URL for fingerprinting: parsed, lower-cased, trailing slash
/// removed. Two spellings of the same location canonicalize identically.
pub fn canonicalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed)
        .map_err(|e| BriefcastError::MalformedPayload(format!("invalid URL '{trimmed}': {e}")))?;

    let mut canonical = parsed.as_str().to_lowercase();
    while canonical.ends_with('/') {
        canonical.pop();
    }

    Ok(canonical)
}

/// Content-addressed identity for an article: SHA-256 of its canonical URL,
/// lowercase hex. Stable across re-ingestion of the same URL.
pub fn fingerprint_url(canonical_url: &str) -> String {
    let digest = Sha256::digest(canonical_url.as_bytes());
    format!("{digest:x}")
}
