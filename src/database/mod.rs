// Database module
// Dual storage: SQLite for report text and status, LanceDB for chunk vectors

pub mod lancedb;
pub mod sqlite;

use async_trait::async_trait;

use crate::RiskError;

pub use self::lancedb::{IndexEntry, VectorStore};
pub use self::sqlite::*;

/// Durable store for submitted reports, keyed by an opaque document id
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist raw report text with status `pending`, returning the new id
    async fn insert(&self, raw_text: &str) -> Result<String, RiskError>;

    async fn set_status(&self, id: &str, update: ReportUpdate) -> Result<(), RiskError>;

    async fn get(&self, id: &str) -> Result<Option<Report>, RiskError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<Report>, RiskError>;

    /// Remove a report. Returns `false` when the id is unknown.
    async fn delete(&self, id: &str) -> Result<bool, RiskError>;
}
