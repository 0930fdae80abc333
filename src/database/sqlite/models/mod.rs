
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// Ledger row tracking the indexing state of one course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CourseRecord {
    pub course_id: String,
    pub status: IndexStatus,
    pub chunks_total: i64,
    pub chunks_stored: i64,
    pub error_message: Option<String>,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
    pub indexed_date: Option<NaiveDateTime>,
}

impl CourseRecord {
    /// A failed course with some chunks stored is resumable by re-ingesting
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.status != IndexStatus::Completed && self.chunks_stored < self.chunks_total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Indexing,
    Completed,
    Failed,
}

impl std::fmt::Display for IndexStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            IndexStatus::Indexing => write!(f, "Indexing"),
            IndexStatus::Completed => write!(f, "Completed"),
            IndexStatus::Failed => write!(f, "Failed"),
        }
    }
}
