// Indexer module
// Ingestion pipeline: chunk course text, embed chunks batch by batch and upsert them


use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use tracing::{debug, error, info, warn};

use crate::course::{CourseContent, CourseId, collection_metadata};
use crate::database::{Document, VectorStore};
use crate::embeddings::chunking::{ChunkingConfig, chunk_text};
use crate::embeddings::Embedder;
use crate::{CourseRagError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Where an ingestion run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Chunking,
    Collection,
    /// Zero-based batch index
    Batch(usize),
}

impl fmt::Display for IngestStage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            IngestStage::Chunking => write!(f, "while chunking"),
            IngestStage::Collection => write!(f, "while preparing the collection"),
            IngestStage::Batch(index) => write!(f, "at batch {}", index + 1),
        }
    }
}

/// Chunks of one course, ready to be embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestPlan {
    pub course_id: CourseId,
    pub chunks: Vec<String>,
}

impl IngestPlan {
    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Reported after each batch is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// One-based index of the batch just stored
    pub batch: usize,
    pub batches: usize,
    pub chunks_stored: usize,
    pub chunks_total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub course_id: CourseId,
    pub collection_name: String,
    pub chunks_stored: usize,
    pub batches: usize,
}

/// Turns course content into stored, embedded chunks.
///
/// Batches run strictly one after another; inside a batch every chunk is embedded
/// concurrently and the batch is upserted only once all embeddings succeeded. A
/// failure leaves earlier batches in the store. Chunk ids are deterministic, so
/// running the same ingestion again overwrites them and completes the course.
pub struct CourseIndexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl CourseIndexer {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            chunking: ChunkingConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Chunk the course's combined text without touching any provider
    #[inline]
    pub fn plan(&self, course: &CourseId, content: &CourseContent) -> Result<IngestPlan> {
        self.plan_text(course, &content.combined_text())
    }

    #[inline]
    pub fn plan_text(&self, course: &CourseId, text: &str) -> Result<IngestPlan> {
        let chunks = chunk_text(text, &self.chunking).map_err(|source| CourseRagError::Ingestion {
            course_id: course.to_string(),
            stage: IngestStage::Chunking,
            chunks_stored: 0,
            source: Box::new(source),
        })?;

        Ok(IngestPlan {
            course_id: course.clone(),
            chunks,
        })
    }

    #[inline]
    pub async fn ingest(&self, course: &CourseId, content: &CourseContent) -> Result<IngestReport> {
        let plan = self.plan(course, content)?;
        self.execute(plan, |_| std::future::ready(())).await
    }

    #[inline]
    pub async fn ingest_text(&self, course: &CourseId, text: &str) -> Result<IngestReport> {
        let plan = self.plan_text(course, text)?;
        self.execute(plan, |_| std::future::ready(())).await
    }

    /// Store every chunk of the plan, awaiting `on_progress` after each stored batch
    /// before the next batch starts
    pub async fn execute<F, Fut>(&self, plan: IngestPlan, mut on_progress: F) -> Result<IngestReport>
    where
        F: FnMut(BatchProgress) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        let course = &plan.course_id;
        let collection = course.collection_name();
        let chunks_total = plan.len();
        let batches = chunks_total.div_ceil(self.batch_size);

        info!(
            "Ingesting course {} into '{}': {} chunks in {} batches",
            course, collection, chunks_total, batches
        );

        self.store
            .create_or_get_collection(&collection, Some(collection_metadata(course)))
            .await
            .map_err(|source| ingestion_error(course, IngestStage::Collection, 0, source))?;

        let created_at = Utc::now();
        let mut chunks_stored = 0;

        for (batch_index, batch) in plan.chunks.chunks(self.batch_size).enumerate() {
            let first_index = batch_index * self.batch_size;
            info!(
                "Processing batch {}/{} for course {}",
                batch_index + 1,
                batches,
                course
            );

            let embeddings = try_join_all(batch.iter().enumerate().map(|(offset, text)| {
                let chunk_index = first_index + offset;
                async move {
                    debug!("Embedding chunk {}/{}", chunk_index + 1, chunks_total);
                    self.embedder.embed(text).await
                }
            }))
            .await
            .map_err(|source| {
                error!(
                    course_id = %course,
                    batch = batch_index + 1,
                    "Embedding failed: {}", source
                );
                ingestion_error(course, IngestStage::Batch(batch_index), chunks_stored, source)
            })?;

            let documents: Vec<Document> = batch
                .iter()
                .zip(embeddings)
                .enumerate()
                .map(|(offset, (text, embedding))| {
                    Document::from_chunk(course, first_index + offset, text.clone(), embedding, created_at)
                })
                .collect();

            self.store
                .upsert(&collection, &documents)
                .await
                .map_err(|source| {
                    error!(
                        course_id = %course,
                        batch = batch_index + 1,
                        "Upsert failed: {}", source
                    );
                    ingestion_error(course, IngestStage::Batch(batch_index), chunks_stored, source)
                })?;

            chunks_stored += documents.len();
            on_progress(BatchProgress {
                batch: batch_index + 1,
                batches,
                chunks_stored,
                chunks_total,
            })
            .await;
        }

        self.warn_about_stale_chunks(&collection, chunks_stored).await;

        info!(
            "Stored {} chunks for course {} in '{}'",
            chunks_stored, course, collection
        );

        Ok(IngestReport {
            course_id: course.clone(),
            collection_name: collection,
            chunks_stored,
            batches,
        })
    }

    /// Chunks beyond the new count survive a re-ingestion of shorter content
    async fn warn_about_stale_chunks(&self, collection: &str, chunks_stored: usize) {
        match self.store.count(collection).await {
            Ok(count) if count > chunks_stored => warn!(
                "Collection '{}' holds {} documents but only {} were written; {} stale chunks remain. \
                 Delete the course index and ingest again to remove them.",
                collection,
                count,
                chunks_stored,
                count - chunks_stored
            ),
            Ok(_) => {}
            Err(e) => debug!("Could not count '{}' after ingestion: {}", collection, e),
        }
    }
}

fn ingestion_error(
    course: &CourseId,
    stage: IngestStage,
    chunks_stored: usize,
    source: CourseRagError,
) -> CourseRagError {
    CourseRagError::Ingestion {
        course_id: course.to_string(),
        stage,
        chunks_stored,
        source: Box::new(source),
    }
}
