
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

const COURSE_COLUMNS: &str = "course_id, status, chunks_total, chunks_stored, error_message, \
                              created_date, updated_date, indexed_date";

pub struct CourseQueries;

impl CourseQueries {
    /// Insert or reset the row for a course about to be (re-)ingested
    #[inline]
    pub async fn begin_ingestion(
        pool: &SqlitePool,
        course_id: &str,
        chunks_total: i64,
    ) -> Result<CourseRecord> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO courses (course_id, status, chunks_total, chunks_stored, error_message, created_date, updated_date)
            VALUES (?, 'indexing', ?, 0, NULL, ?, ?)
            ON CONFLICT(course_id) DO UPDATE SET
                status = 'indexing',
                chunks_total = excluded.chunks_total,
                chunks_stored = 0,
                error_message = NULL,
                updated_date = excluded.updated_date
            "#,
        )
        .bind(course_id)
        .bind(chunks_total)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record ingestion start")?;

        debug!("Course {} marked as indexing", course_id);

        Self::get(pool, course_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve course {} after insert", course_id))
    }

    #[inline]
    pub async fn mark_completed(
        pool: &SqlitePool,
        course_id: &str,
        chunks_stored: i64,
    ) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "UPDATE courses SET status = 'completed', chunks_stored = ?, error_message = NULL, \
             updated_date = ?, indexed_date = ? WHERE course_id = ?",
        )
        .bind(chunks_stored)
        .bind(now)
        .bind(now)
        .bind(course_id)
        .execute(pool)
        .await
        .context("Failed to mark course completed")?;

        Ok(())
    }

    /// Advance the stored-chunk count of a course that is still indexing
    #[inline]
    pub async fn record_progress(
        pool: &SqlitePool,
        course_id: &str,
        chunks_stored: i64,
    ) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "UPDATE courses SET chunks_stored = ?, updated_date = ? \
             WHERE course_id = ? AND status = 'indexing'",
        )
        .bind(chunks_stored)
        .bind(now)
        .bind(course_id)
        .execute(pool)
        .await
        .context("Failed to record ingestion progress")?;

        Ok(())
    }

    #[inline]
    pub async fn mark_failed(
        pool: &SqlitePool,
        course_id: &str,
        chunks_stored: i64,
        error_message: &str,
    ) -> Result<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "UPDATE courses SET status = 'failed', chunks_stored = ?, error_message = ?, \
             updated_date = ? WHERE course_id = ?",
        )
        .bind(chunks_stored)
        .bind(error_message)
        .bind(now)
        .bind(course_id)
        .execute(pool)
        .await
        .context("Failed to mark course failed")?;

        Ok(())
    }

    #[inline]
    pub async fn get(pool: &SqlitePool, course_id: &str) -> Result<Option<CourseRecord>> {
        let sql = format!("SELECT {} FROM courses WHERE course_id = ?", COURSE_COLUMNS);
        sqlx::query_as::<_, CourseRecord>(&sql)
            .bind(course_id)
            .fetch_optional(pool)
            .await
            .context("Failed to get course")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<CourseRecord>> {
        let sql = format!("SELECT {} FROM courses ORDER BY course_id", COURSE_COLUMNS);
        sqlx::query_as::<_, CourseRecord>(&sql)
            .fetch_all(pool)
            .await
            .context("Failed to list courses")
    }

    /// Returns whether a row was removed
    #[inline]
    pub async fn delete(pool: &SqlitePool, course_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE course_id = ?")
            .bind(course_id)
            .execute(pool)
            .await
            .context("Failed to delete course")?;

        Ok(result.rows_affected() > 0)
    }
}
