#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{DistanceMetric, SearchHit, VectorRecord};
use crate::{BriefcastError, Result};

const TABLE_NAME: &str = "embeddings";

/// Persisted next to the index directory so a reopen can detect that the
/// caller changed the distance metric or embedding dimension.
#[derive(Debug, Serialize, Deserialize)]
struct IndexMeta {
    metric: DistanceMetric,
    dimension: usize,
}

/// LanceDB-backed chunk vector index. Writes are per-article and wholesale:
/// an article's old vectors are always deleted before its new ones land, so
/// re-indexing can never leave a stale mix behind.
pub struct VectorIndex {
    connection: Connection,
    dimension: usize,
    metric: DistanceMetric,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    pub async fn open<P: AsRef<Path>>(
        path: P,
        metric: DistanceMetric,
        dimension: usize,
    ) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&db_path).map_err(|e| {
            BriefcastError::Database(format!("failed to create vector index directory: {e}"))
        })?;

        Self::check_meta(&db_path, metric, dimension)?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to open vector index: {e}")))?;

        let index = Self {
            connection,
            dimension,
            metric,
        };
        index.ensure_table().await?;

        info!("opened vector index at {} ({metric}, {dimension}d)", db_path.display());
        Ok(index)
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Verify or write the sidecar metadata file. A metric change is the one
    /// misconfiguration that silently corrupts every ranking, so it gets its
    /// own error variant.
    fn check_meta(db_path: &Path, metric: DistanceMetric, dimension: usize) -> Result<()> {
        let meta_path = meta_path_for(db_path);

        if meta_path.exists() {
            let content = std::fs::read_to_string(&meta_path).map_err(|e| {
                BriefcastError::Database(format!("failed to read index metadata: {e}"))
            })?;
            let meta: IndexMeta = toml::from_str(&content).map_err(|e| {
                BriefcastError::Database(format!("failed to parse index metadata: {e}"))
            })?;

            if meta.metric != metric {
                return Err(BriefcastError::IndexMetricMismatch {
                    existing: meta.metric.to_string(),
                    requested: metric.to_string(),
                });
            }
            if meta.dimension != dimension {
                return Err(BriefcastError::Database(format!(
                    "vector index was created with dimension {}, requested {dimension}",
                    meta.dimension
                )));
            }
        } else {
            let meta = IndexMeta { metric, dimension };
            let content = toml::to_string(&meta).map_err(|e| {
                BriefcastError::Database(format!("failed to serialize index metadata: {e}"))
            })?;
            std::fs::write(&meta_path, content).map_err(|e| {
                BriefcastError::Database(format!("failed to write index metadata: {e}"))
            })?;
        }

        Ok(())
    }

    async fn ensure_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to list tables: {e}")))?;

        if table_names.contains(&TABLE_NAME.to_string()) {
            return Ok(());
        }

        self.connection
            .create_empty_table(TABLE_NAME, self.schema())
            .execute()
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to create table: {e}")))?;

        debug!("created embeddings table with {} dimensions", self.dimension);
        Ok(())
    }

    async fn table(&self) -> Result<Table> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to open table: {e}")))
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("article_fingerprint", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("domain", DataType::Utf8, true),
            Field::new("published_at", DataType::Utf8, true),
            Field::new("tags", DataType::Utf8, true),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Replace every vector belonging to `fingerprint` with `records`. The
    /// delete always runs, so passing an empty slice clears the article.
    pub async fn upsert_article(&self, fingerprint: &str, records: &[VectorRecord]) -> Result<()> {
        for record in records {
            if record.vector.len() != self.dimension {
                return Err(BriefcastError::Database(format!(
                    "vector for {} has dimension {}, index expects {}",
                    record.id,
                    record.vector.len(),
                    self.dimension
                )));
            }
            if record.article_fingerprint != fingerprint {
                return Err(BriefcastError::Database(format!(
                    "record {} belongs to article {}, not {fingerprint}",
                    record.id, record.article_fingerprint
                )));
            }
        }

        let table = self.table().await?;
        table
            .delete(&fingerprint_predicate(fingerprint))
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to delete old vectors: {e}")))?;

        if records.is_empty() {
            debug!("cleared vectors for article {fingerprint}");
            return Ok(());
        }

        let batch = self.record_batch(records)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to insert vectors: {e}")))?;

        debug!("indexed {} vector(s) for article {fingerprint}", records.len());
        Ok(())
    }

    pub async fn delete_by_article(&self, fingerprint: &str) -> Result<()> {
        let table = self.table().await?;
        table
            .delete(&fingerprint_predicate(fingerprint))
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to delete vectors: {e}")))?;
        Ok(())
    }

    fn record_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut fingerprints = Vec::with_capacity(len);
        let mut chunk_indexes = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut domains = Vec::with_capacity(len);
        let mut published = Vec::with_capacity(len);
        let mut tags = Vec::with_capacity(len);
        let mut created = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for record in records {
            ids.push(record.id.as_str());
            fingerprints.push(record.article_fingerprint.as_str());
            chunk_indexes.push(record.chunk_index);
            contents.push(record.content.as_str());
            domains.push(record.domain.as_deref());
            published.push(record.published_at.as_deref());
            tags.push(record.tags.as_deref());
            created.push(record.created_at.as_str());
            flat_values.extend_from_slice(&record.vector);
        }

        let values = Float32Array::from(flat_values);
        let item_field = Arc::new(Field::new("item", DataType::Float32, false));
        let vectors =
            FixedSizeListArray::try_new(item_field, self.dimension as i32, Arc::new(values), None)
                .map_err(|e| {
                    BriefcastError::Database(format!("failed to build vector array: {e}"))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vectors),
            Arc::new(StringArray::from(fingerprints)),
            Arc::new(UInt32Array::from(chunk_indexes)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(domains)),
            Arc::new(StringArray::from(published)),
            Arc::new(StringArray::from(tags)),
            Arc::new(StringArray::from(created)),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| BriefcastError::Database(format!("failed to build record batch: {e}")))
    }

    /// Nearest-neighbor query. Ties on distance break by chunk index then
    /// fingerprint so results are stable across runs.
    pub async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        if vector.len() != self.dimension {
            return Err(BriefcastError::Database(format!(
                "query vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let table = self.table().await?;
        let mut query = table
            .vector_search(vector)
            .map_err(|e| BriefcastError::Database(format!("failed to build vector query: {e}")))?
            .column("vector")
            .distance_type(self.metric.into())
            .limit(limit);

        if let Some(predicate) = filter {
            query = query.only_if(predicate.to_string());
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to run vector query: {e}")))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to read query results: {e}")))?
        {
            hits.extend(parse_hits(&batch)?);
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
                .then_with(|| a.article_fingerprint.cmp(&b.article_fingerprint))
        });
        hits.truncate(limit);

        debug!("vector query returned {} hit(s)", hits.len());
        Ok(hits)
    }

    pub async fn count_for_article(&self, fingerprint: &str) -> Result<usize> {
        let table = self.table().await?;
        let count = table
            .count_rows(Some(fingerprint_predicate(fingerprint)))
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to count vectors: {e}")))?;
        Ok(count)
    }

    pub async fn count_all(&self) -> Result<usize> {
        let table = self.table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| BriefcastError::Database(format!("failed to count vectors: {e}")))?;
        Ok(count)
    }
}

fn meta_path_for(db_path: &Path) -> PathBuf {
    db_path.join("index.meta.toml")
}

/// SQL-ish predicate for one article. Fingerprints are lowercase hex, but the
/// quote escape keeps arbitrary strings safe.
fn fingerprint_predicate(fingerprint: &str) -> String {
    format!("article_fingerprint = '{}'", fingerprint.replace('\'', "''"))
}

fn parse_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let fingerprints = string_column(batch, "article_fingerprint")?;
    let chunk_indexes = batch
        .column_by_name("chunk_index")
        .and_then(|col| col.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| BriefcastError::Database("missing chunk_index column".to_string()))?;
    let contents = string_column(batch, "content")?;
    let domains = string_column(batch, "domain")?;
    let published = string_column(batch, "published_at")?;
    let tags = string_column(batch, "tags")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        hits.push(SearchHit {
            article_fingerprint: fingerprints.value(row).to_string(),
            chunk_index: chunk_indexes.value(row),
            content: contents.value(row).to_string(),
            distance,
            domain: optional_value(domains, row),
            published_at: optional_value(published, row),
            tags: optional_value(tags, row),
        });
    }

    Ok(hits)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| BriefcastError::Database(format!("missing {name} column")))
}

fn optional_value(array: &StringArray, row: usize) -> Option<String> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row).to_string())
    }
}
