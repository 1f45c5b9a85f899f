
use super::{IndexEntry, SearchHit, document_filter};
use crate::{RiskError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::cmp::Ordering;
use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TABLE_NAME: &str = "report_chunks";

/// Vector store for report chunks using LanceDB cosine search
pub struct VectorStore {
    table: Table,
    dimension: usize,
    timeout: Duration,
}

impl VectorStore {
    /// Open the vector store under the configured base directory
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self, RiskError> {
        Self::new(
            &config.vector_database_path(),
            config.ollama.embedding_dimension as usize,
            Duration::from_secs(config.storage.timeout_secs),
        )
        .await
    }

    /// Open or create the chunk table at `db_path`.
    ///
    /// An existing table must have been created with the same vector dimension.
    #[inline]
    pub async fn new(db_path: &Path, dimension: usize, timeout: Duration) -> Result<Self, RiskError> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RiskError::Storage(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection =
            with_timeout(timeout, "connect", lancedb::connect(&uri).execute()).await?;

        let table_names =
            with_timeout(timeout, "list tables", connection.table_names().execute()).await?;

        let table = if table_names.iter().any(|name| name == TABLE_NAME) {
            let table = with_timeout(
                timeout,
                "open table",
                connection.open_table(TABLE_NAME).execute(),
            )
            .await?;

            let existing = detect_vector_dimension(&table, timeout).await?;
            if existing != dimension {
                return Err(RiskError::Storage(format!(
                    "Vector table has dimension {} but {} is configured",
                    existing, dimension
                )));
            }
            debug!("Opened existing chunk table with {} dimensions", existing);
            table
        } else {
            info!("Creating chunk table with {} dimensions", dimension);
            with_timeout(
                timeout,
                "create table",
                connection
                    .create_empty_table(TABLE_NAME, create_schema(dimension))
                    .execute(),
            )
            .await?
        };

        Ok(Self {
            table,
            dimension,
            timeout,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Append entries. Every vector must have the table dimension; nothing is written otherwise.
    #[inline]
    pub async fn add_entries(&self, entries: &[IndexEntry]) -> Result<(), RiskError> {
        if entries.is_empty() {
            debug!("No entries to store");
            return Ok(());
        }

        if let Some(entry) = entries.iter().find(|e| e.vector.len() != self.dimension) {
            return Err(RiskError::Storage(format!(
                "Entry {} of document {} has {} dimensions, expected {}",
                entry.ordinal,
                entry.document_id,
                entry.vector.len(),
                self.dimension
            )));
        }

        let record_batch = self.create_record_batch(entries)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        with_timeout(self.timeout, "insert entries", self.table.add(reader).execute()).await?;

        debug!("Stored {} index entries", entries.len());
        Ok(())
    }

    fn create_record_batch(&self, entries: &[IndexEntry]) -> Result<RecordBatch, RiskError> {
        let len = entries.len();

        let mut ids = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut ordinals = Vec::with_capacity(len);
        let mut chunk_texts = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for entry in entries {
            ids.push(entry.id.as_str());
            document_ids.push(entry.document_id.as_str());
            ordinals.push(entry.ordinal);
            chunk_texts.push(entry.chunk_text.as_str());
            created_ats.push(entry.created_at.as_str());
            flat_values.extend_from_slice(&entry.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_size(self.dimension)?,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RiskError::Storage(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(UInt32Array::from(ordinals)),
            Arc::new(StringArray::from(chunk_texts)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(create_schema(self.dimension), arrays)
            .map_err(|e| RiskError::Storage(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest chunks of one document by cosine distance.
    ///
    /// Results are ordered by ascending distance with ties broken by ordinal; NaN distances
    /// sort last. A document without rows yields an empty result.
    #[inline]
    pub async fn search(
        &self,
        document_id: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, RiskError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.dimension {
            return Err(RiskError::Storage(format!(
                "Query vector has {} dimensions, expected {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let candidates = self.count_for_document(document_id).await?;
        if candidates == 0 {
            debug!("No index entries for document {}", document_id);
            return Ok(Vec::new());
        }

        // Fetch every candidate so ordinal tie-breaking is applied across the whole document
        let query = self
            .table
            .vector_search(query_vector)
            .map_err(|e| RiskError::Storage(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(document_filter(document_id))
            .limit(candidates);

        let stream = with_timeout(self.timeout, "execute search", query.execute()).await?;
        let batches: Vec<RecordBatch> =
            with_timeout(self.timeout, "read search results", stream.try_collect()).await?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(parse_search_batch(batch)?);
        }

        hits.sort_by(compare_hits);
        hits.truncate(top_k);

        debug!(
            "Search for document {} returned {} of {} entries",
            document_id,
            hits.len(),
            candidates
        );
        Ok(hits)
    }

    /// Remove every entry of a document
    #[inline]
    pub async fn delete_document(&self, document_id: &str) -> Result<(), RiskError> {
        debug!("Deleting index entries for document: {}", document_id);

        with_timeout(
            self.timeout,
            "delete entries",
            self.table.delete(&document_filter(document_id)),
        )
        .await?;

        Ok(())
    }

    #[inline]
    pub async fn count_for_document(&self, document_id: &str) -> Result<usize, RiskError> {
        with_timeout(
            self.timeout,
            "count rows",
            self.table.count_rows(Some(document_filter(document_id))),
        )
        .await
    }

    /// Total number of entries across all documents
    #[inline]
    pub async fn count_entries(&self) -> Result<usize, RiskError> {
        with_timeout(self.timeout, "count rows", self.table.count_rows(None)).await
    }
}

async fn with_timeout<T, E, F>(timeout: Duration, operation: &str, future: F) -> Result<T, RiskError>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RiskError::Storage(format!(
            "Vector store failed to {}: {}",
            operation, e
        ))),
        Err(_) => {
            warn!("Vector store {} timed out after {:?}", operation, timeout);
            Err(RiskError::Storage(format!(
                "Vector store timed out during {} after {:?}",
                operation, timeout
            )))
        }
    }
}

fn vector_size(dimension: usize) -> Result<i32, RiskError> {
    i32::try_from(dimension)
        .map_err(|_| RiskError::Storage(format!("Vector dimension {} is too large", dimension)))
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("ordinal", DataType::UInt32, false),
        Field::new("chunk_text", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                i32::try_from(dimension).unwrap_or(i32::MAX),
            ),
            false,
        ),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

async fn detect_vector_dimension(table: &Table, timeout: Duration) -> Result<usize, RiskError> {
    let schema = with_timeout(timeout, "read table schema", table.schema()).await?;

    match schema.field_with_name("vector").map(|f| f.data_type()) {
        Ok(DataType::FixedSizeList(_, size)) => usize::try_from(*size)
            .map_err(|_| RiskError::Storage(format!("Invalid vector dimension {}", size))),
        _ => Err(RiskError::Storage(
            "Could not find vector column or determine dimension".to_string(),
        )),
    }
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    let by_distance = match (a.distance.is_nan(), b.distance.is_nan()) {
        (false, false) => a.distance.total_cmp(&b.distance),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    };
    by_distance.then(a.ordinal.cmp(&b.ordinal))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RiskError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RiskError::Storage(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RiskError::Storage(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>, RiskError> {
    let document_ids = string_column(batch, "document_id")?;
    let chunk_texts = string_column(batch, "chunk_text")?;

    let ordinals = batch
        .column_by_name("ordinal")
        .ok_or_else(|| RiskError::Storage("Missing ordinal column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RiskError::Storage("Invalid ordinal column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let hits = (0..batch.num_rows())
        .map(|row| SearchHit {
            document_id: document_ids.value(row).to_string(),
            ordinal: ordinals.value(row),
            chunk_text: chunk_texts.value(row).to_string(),
            distance: distances.map_or(f32::NAN, |d| {
                if d.is_null(row) { f32::NAN } else { d.value(row) }
            }),
        })
        .collect();

    Ok(hits)
}
