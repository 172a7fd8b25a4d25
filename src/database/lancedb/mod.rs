pub mod vector_store;

use serde::{Deserialize, Serialize};

/// Distance function the index was created with. Persisted alongside the
/// index so reopening with a different metric fails loudly instead of
/// silently reranking everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
}

impl DistanceMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Some(DistanceMetric::Cosine),
            "l2" => Some(DistanceMetric::L2),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DistanceMetric> for lancedb::DistanceType {
    fn from(metric: DistanceMetric) -> Self {
        match metric {
            DistanceMetric::Cosine => lancedb::DistanceType::Cosine,
            DistanceMetric::L2 => lancedb::DistanceType::L2,
        }
    }
}

/// One chunk embedding plus the metadata snapshot that makes filtered
/// similarity queries possible without a SQLite join.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub article_fingerprint: String,
    pub chunk_index: u32,
    pub content: String,
    pub domain: Option<String>,
    /// ISO date string, empty when the article is undated.
    pub published_at: Option<String>,
    /// Comma-joined tag snapshot taken at indexing time.
    pub tags: Option<String>,
    pub created_at: String,
}

/// One row of a similarity query, already joined with its stored metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub article_fingerprint: String,
    pub chunk_index: u32,
    pub content: String,
    pub distance: f32,
    pub domain: Option<String>,
    pub published_at: Option<String>,
    pub tags: Option<String>,
}
