use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::RiskError;
use crate::config::StorageConfig;
use crate::database::DocumentStore;
use crate::database::sqlite::queries::ReportQueries;


pub mod models;
pub mod queries;

pub use models::{Report, ReportStatus, ReportUpdate};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
    timeout: Duration,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P, storage: &StorageConfig) -> Result<Self> {
        let timeout = Duration::from_secs(storage.timeout_secs);
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(storage.max_connections)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool, timeout };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(
        config_dir: &Path,
        storage: &StorageConfig,
    ) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("reports.db"), storage).await
    }

    async fn guarded<T, F>(&self, operation: &str, future: F) -> Result<T, RiskError>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RiskError::Storage(format!("{operation} failed: {e:#}"))),
            Err(_) => Err(RiskError::Storage(format!(
                "{operation} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn insert(&self, raw_text: &str) -> Result<String, RiskError> {
        let report = self
            .guarded("Report insert", ReportQueries::create(&self.pool, raw_text))
            .await?;
        Ok(report.id)
    }

    async fn set_status(&self, id: &str, update: ReportUpdate) -> Result<(), RiskError> {
        let updated = self
            .guarded("Report update", ReportQueries::update(&self.pool, id, update))
            .await?;

        match updated {
            Some(_) => Ok(()),
            None => Err(RiskError::Storage(format!("Report {id} not found"))),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Report>, RiskError> {
        self.guarded("Report lookup", ReportQueries::get_by_id(&self.pool, id))
            .await
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Report>, RiskError> {
        self.guarded("Report listing", ReportQueries::list_recent(&self.pool, limit))
            .await
    }

    async fn delete(&self, id: &str) -> Result<bool, RiskError> {
        self.guarded("Report delete", ReportQueries::delete(&self.pool, id))
            .await
    }
}
