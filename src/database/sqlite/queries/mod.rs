#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

const REPORT_COLUMNS: &str =
    "id, raw_text, status, stored_chunks, error_message, created_at, updated_at";

pub struct ReportQueries;

impl ReportQueries {
    /// Generate a fresh opaque document identifier
    #[inline]
    pub fn new_id() -> String {
        format!("doc_{}", Uuid::new_v4().simple())
    }

    #[inline]
    pub async fn create(pool: &SqlitePool, raw_text: &str) -> Result<Report> {
        let id = Self::new_id();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO reports (id, raw_text, status, stored_chunks, created_at, updated_at) \
             VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(raw_text)
        .bind(ReportStatus::Pending)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create report")?;

        debug!("Created report {}", id);

        Self::get_by_id(pool, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created report"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Report>> {
        let query = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?");
        let report = sqlx::query_as::<_, Report>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get report by id")?;

        Ok(report)
    }

    #[inline]
    pub async fn list_recent(pool: &SqlitePool, limit: u32) -> Result<Vec<Report>> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at DESC, id LIMIT ?"
        );
        let reports = sqlx::query_as::<_, Report>(&query)
            .bind(i64::from(limit))
            .fetch_all(pool)
            .await
            .context("Failed to list reports")?;

        Ok(reports)
    }

    #[inline]
    pub async fn list_by_status(pool: &SqlitePool, status: ReportStatus) -> Result<Vec<Report>> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE status = ? ORDER BY created_at DESC"
        );
        let reports = sqlx::query_as::<_, Report>(&query)
            .bind(status)
            .fetch_all(pool)
            .await
            .context("Failed to list reports by status")?;

        Ok(reports)
    }

    /// Apply a status change. Returns `None` when the report does not exist.
    #[inline]
    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        update: ReportUpdate,
    ) -> Result<Option<Report>> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            "UPDATE reports SET status = ?, \
                 stored_chunks = COALESCE(?, stored_chunks), \
                 error_message = ?, \
                 updated_at = ? \
             WHERE id = ?",
        )
        .bind(update.status)
        .bind(update.stored_chunks)
        .bind(update.error_message)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update report")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete report")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
            .fetch_one(pool)
            .await
            .context("Failed to count reports")?;

        Ok(count)
    }
}
