// Course ledger: one row per course recording how far its last ingestion got

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::CourseRecord;
use crate::database::sqlite::queries::CourseQueries;


pub mod models;
pub mod queries;

pub use models::IndexStatus;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
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

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    pub async fn begin_ingestion(&self, course_id: &str, chunks_total: usize) -> Result<CourseRecord> {
        CourseQueries::begin_ingestion(&self.pool, course_id, count(chunks_total)).await
    }

    pub async fn mark_completed(&self, course_id: &str, chunks_stored: usize) -> Result<()> {
        CourseQueries::mark_completed(&self.pool, course_id, count(chunks_stored)).await
    }

    pub async fn record_progress(&self, course_id: &str, chunks_stored: usize) -> Result<()> {
        CourseQueries::record_progress(&self.pool, course_id, count(chunks_stored)).await
    }

    pub async fn mark_failed(
        &self,
        course_id: &str,
        chunks_stored: usize,
        error_message: &str,
    ) -> Result<()> {
        CourseQueries::mark_failed(&self.pool, course_id, count(chunks_stored), error_message)
            .await
    }

    pub async fn get_course(&self, course_id: &str) -> Result<Option<CourseRecord>> {
        CourseQueries::get(&self.pool, course_id).await
    }

    pub async fn list_courses(&self) -> Result<Vec<CourseRecord>> {
        CourseQueries::list_all(&self.pool).await
    }

    pub async fn delete_course(&self, course_id: &str) -> Result<bool> {
        CourseQueries::delete(&self.pool, course_id).await
    }
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
