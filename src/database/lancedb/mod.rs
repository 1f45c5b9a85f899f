// LanceDB vector database module
// Chunk vectors and nearest-neighbour search scoped by document id


pub mod vector_store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use vector_store::VectorStore;

/// One stored chunk and its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub document_id: String,
    /// Position of the chunk within its report
    pub ordinal: u32,
    pub chunk_text: String,
    pub vector: Vec<f32>,
    /// RFC 3339 insertion timestamp
    pub created_at: String,
}

impl IndexEntry {
    #[inline]
    pub fn new(document_id: &str, ordinal: u32, chunk_text: String, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            ordinal,
            chunk_text,
            vector,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Search hit, ordered by ascending distance
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub document_id: String,
    pub ordinal: u32,
    pub chunk_text: String,
    pub distance: f32,
}

/// Build a `document_id = '...'` predicate with the literal escaped
#[inline]
pub fn document_filter(document_id: &str) -> String {
    format!("document_id = '{}'", document_id.replace('\'', "''"))
}
