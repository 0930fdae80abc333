use thiserror::Error;

pub use crate::http::ProviderError;
pub use crate::indexer::IngestStage;

pub type Result<T> = std::result::Result<T, CourseRagError>;

/// Message shown to learners when an answer could not be produced
pub const ASSISTANT_UNAVAILABLE: &str = "AI assistant unavailable";

#[derive(Error, Debug)]
pub enum CourseRagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(#[source] ProviderError),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Vector store write to '{collection}' failed: {source}")]
    StoreWrite {
        collection: String,
        #[source]
        source: ProviderError,
    },

    #[error("Vector store query on '{collection}' failed: {source}")]
    StoreQuery {
        collection: String,
        #[source]
        source: ProviderError,
    },

    #[error("Completion model error: {0}")]
    Completion(#[source] ProviderError),

    #[error("Ingestion of course '{course_id}' failed {stage} ({chunks_stored} chunks stored): {source}")]
    Ingestion {
        course_id: String,
        stage: IngestStage,
        chunks_stored: usize,
        #[source]
        source: Box<CourseRagError>,
    },

    #[error("Ingestion of course '{course_id}' was interrupted ({chunks_stored} chunks stored)")]
    Interrupted {
        course_id: String,
        chunks_stored: usize,
    },

    #[error("Answer generation for course '{course_id}' failed: {source}")]
    AnswerGeneration {
        course_id: String,
        #[source]
        source: Box<CourseRagError>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl CourseRagError {
    /// Text that is safe to show to an end user
    #[inline]
    pub fn user_message(&self) -> String {
        match self {
            Self::AnswerGeneration { .. } => ASSISTANT_UNAVAILABLE.to_string(),
            Self::Ingestion {
                course_id,
                stage,
                chunks_stored,
                ..
            } => format!(
                "Indexing course {} stopped {} after {} chunks were stored. Re-running ingestion is safe and will complete the index.",
                course_id, stage, chunks_stored
            ),
            Self::Interrupted {
                course_id,
                chunks_stored,
            } => format!(
                "Indexing course {} was interrupted after {} chunks were stored. Re-running ingestion is safe and will complete the index.",
                course_id, chunks_stored
            ),
            Self::CollectionNotFound(name) => format!("No index exists yet for '{}'", name),
            other => other.to_string(),
        }
    }

    /// Whether retrying the same call may succeed
    #[inline]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EmbeddingProvider(source)
            | Self::Completion(source)
            | Self::StoreWrite { source, .. }
            | Self::StoreQuery { source, .. } => source.is_transient(),
            Self::Ingestion { source, .. } | Self::AnswerGeneration { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

pub mod assistant;
pub mod commands;
pub mod completion;
pub mod config;
pub mod course;
pub mod database;
pub mod embeddings;
pub mod http;
pub mod indexer;
pub mod service;

#[cfg(test)]
mod testing;
