// Indexer module
// Embeds report chunks into the vector store and answers document-scoped queries


use std::sync::Arc;

use tracing::{debug, info};

use crate::RiskError;
use crate::database::lancedb::{IndexEntry, VectorStore};
use crate::embeddings::{ChunkingConfig, Embedder};

/// Chunk index keyed by document id
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
}

impl VectorIndex {
    /// Build an index over `store`.
    ///
    /// The embedder's dimension must match the dimension the store was opened with.
    #[inline]
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Result<Self, RiskError> {
        if store.dimension() != embedder.dimension() {
            return Err(RiskError::Config(format!(
                "Embedder produces {} dimensions but the vector store holds {}",
                embedder.dimension(),
                store.dimension()
            )));
        }

        Ok(Self {
            store,
            embedder,
            chunking,
        })
    }

    #[inline]
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    #[inline]
    pub fn chunking(&self) -> &ChunkingConfig {
        &self.chunking
    }

    /// Embed and store `chunks` for a document, replacing any rows it already has.
    ///
    /// Returns the number of stored chunks. An empty slice stores nothing and makes no
    /// provider call. If embedding fails nothing is written.
    #[inline]
    pub async fn upsert(&self, document_id: &str, chunks: &[String]) -> Result<usize, RiskError> {
        if chunks.is_empty() {
            debug!("No chunks to index for document {}", document_id);
            return Ok(0);
        }

        let vectors = self.embedder.embed(chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(RiskError::Provider(format!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let entries = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(ordinal, (chunk, vector))| {
                let ordinal = u32::try_from(ordinal).map_err(|_| {
                    RiskError::Storage(format!("Too many chunks for document {}", document_id))
                })?;
                Ok(IndexEntry::new(document_id, ordinal, chunk.clone(), vector))
            })
            .collect::<Result<Vec<_>, RiskError>>()?;

        self.store.delete_document(document_id).await?;
        self.store.add_entries(&entries).await?;

        info!("Indexed {} chunks for document {}", entries.len(), document_id);
        Ok(entries.len())
    }

    /// Texts of the `top_k` chunks of a document nearest to `query_text`
    #[inline]
    pub async fn query(
        &self,
        document_id: &str,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<String>, RiskError> {
        let prepared = self.chunking.prepare_query(query_text);
        let vectors = self.embedder.embed(std::slice::from_ref(&prepared)).await?;
        let query_vector = vectors.into_iter().next().ok_or_else(|| {
            RiskError::Provider("Embedder returned no vector for the query".to_string())
        })?;

        let hits = self.store.search(document_id, &query_vector, top_k).await?;
        debug!(
            "Retrieved {} chunks for document {} (top_k {})",
            hits.len(),
            document_id,
            top_k
        );

        Ok(hits.into_iter().map(|hit| hit.chunk_text).collect())
    }

    #[inline]
    pub async fn delete_document(&self, document_id: &str) -> Result<(), RiskError> {
        self.store.delete_document(document_id).await
    }

    #[inline]
    pub async fn count_for_document(&self, document_id: &str) -> Result<usize, RiskError> {
        self.store.count_for_document(document_id).await
    }
}
