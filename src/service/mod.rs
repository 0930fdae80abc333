// Service facade: wires configuration, providers and the course ledger together


use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::assistant::CourseAssistant;
use crate::completion::{ChatCompletionClient, CompletionModel};
use crate::config::{Config, IngestionConfig, RetrievalConfig, VectorBackend};
use crate::course::{CourseContent, CourseId};
use crate::database::sqlite::models::CourseRecord;
use crate::database::sqlite::{Database, IndexStatus};
use crate::database::{ChromaStore, LanceStore, QueryResult, VectorStore};
use crate::embeddings::{Embedder, EmbeddingClient, RetryingEmbedder};
use crate::indexer::{BatchProgress, CourseIndexer, IngestPlan, IngestReport};
use crate::{CourseRagError, Result};

/// What is known about one course's index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseIndexInfo {
    pub course_id: CourseId,
    pub collection_name: String,
    pub chunk_count: usize,
    pub record: Option<CourseRecord>,
}

/// One row of the course listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseSummary {
    pub course_id: String,
    /// Whether the vector store holds a collection for this course
    pub indexed: bool,
    pub status: Option<IndexStatus>,
    pub chunks_stored: Option<i64>,
    pub chunks_total: Option<i64>,
}

pub struct CourseRag {
    indexer: CourseIndexer,
    assistant: CourseAssistant,
    store: Arc<dyn VectorStore>,
    ledger: Option<Database>,
}

impl CourseRag {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        completion: Arc<dyn CompletionModel>,
        ledger: Option<Database>,
    ) -> Self {
        Self {
            indexer: CourseIndexer::new(Arc::clone(&embedder), Arc::clone(&store)),
            assistant: CourseAssistant::new(embedder, Arc::clone(&store), completion),
            store,
            ledger,
        }
    }

    #[inline]
    pub fn with_ingestion(mut self, ingestion: &IngestionConfig) -> Self {
        self.indexer = self
            .indexer
            .with_batch_size(ingestion.batch_size)
            .with_chunking(ingestion.chunking());
        self
    }

    #[inline]
    pub fn with_retrieval(mut self, retrieval: &RetrievalConfig, temperature: f32) -> Self {
        self.assistant = self
            .assistant
            .with_top_k(retrieval.top_k)
            .with_temperature(temperature);
        self
    }

    /// Build every provider from a validated configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CourseRagError::Config(e.to_string()))?;

        let client = EmbeddingClient::new(&config.embedding)?;
        let embedder: Arc<dyn Embedder> = if config.embedding.retry_attempts > 1 {
            Arc::new(RetryingEmbedder::new(client, config.embedding.retry_attempts))
        } else {
            Arc::new(client)
        };

        let store: Arc<dyn VectorStore> = match config.vector_store.backend {
            VectorBackend::Chroma => Arc::new(ChromaStore::new(&config.vector_store)?),
            VectorBackend::LanceDb => Arc::new(
                LanceStore::open(&config.vector_database_path(), config.embedding.dimension)
                    .await?,
            ),
        };

        let completion: Arc<dyn CompletionModel> =
            Arc::new(ChatCompletionClient::new(&config.completion)?);

        let ledger = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(|e| CourseRagError::Database(format!("{:#}", e)))?;

        info!(
            "Course RAG ready: {} backend, embedding model {}, completion model {}",
            config.vector_store.backend, config.embedding.model, config.completion.model
        );

        Ok(Self::new(embedder, store, completion, Some(ledger))
            .with_ingestion(&config.ingestion)
            .with_retrieval(&config.retrieval, config.completion.temperature))
    }

    /// Validate the content and split it into chunks without calling any provider
    #[inline]
    pub fn plan_course(&self, course: &CourseId, content: &CourseContent) -> Result<IngestPlan> {
        content.validate()?;
        self.indexer.plan(course, content)
    }

    #[inline]
    pub async fn ingest_course(
        &self,
        course: &CourseId,
        content: &CourseContent,
    ) -> Result<IngestReport> {
        let plan = self.plan_course(course, content)?;
        self.ingest_plan(plan, |_| {}).await
    }

    /// Run a planned ingestion, keeping the ledger in step with its outcome.
    ///
    /// The ledger's stored-chunk count advances after every batch, so dropping this
    /// future mid-run leaves the row `indexing` with the chunks actually stored.
    /// Use [`CourseRag::record_interrupted`] to close such a row.
    pub async fn ingest_plan<F>(&self, plan: IngestPlan, mut on_progress: F) -> Result<IngestReport>
    where
        F: FnMut(BatchProgress) + Send,
    {
        let course = plan.course_id.clone();

        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.begin_ingestion(course.as_str(), plan.len()).await {
                warn!("Could not record ingestion start for {}: {:#}", course, e);
            }
        }

        let outcome = self
            .indexer
            .execute(plan, |progress| {
                on_progress(progress);
                let ledger = self.ledger.clone();
                let course = course.clone();
                async move {
                    if let Some(ledger) = ledger {
                        if let Err(e) = ledger
                            .record_progress(course.as_str(), progress.chunks_stored)
                            .await
                        {
                            warn!("Could not record progress for {}: {:#}", course, e);
                        }
                    }
                }
            })
            .await;

        if let Some(ledger) = &self.ledger {
            let recorded = match &outcome {
                Ok(report) => ledger
                    .mark_completed(course.as_str(), report.chunks_stored)
                    .await,
                Err(error) => {
                    let chunks_stored = match error {
                        CourseRagError::Ingestion { chunks_stored, .. } => *chunks_stored,
                        _ => 0,
                    };
                    ledger
                        .mark_failed(course.as_str(), chunks_stored, &error.to_string())
                        .await
                }
            };
            if let Err(e) = recorded {
                warn!("Could not record ingestion outcome for {}: {:#}", course, e);
            }
        }

        outcome
    }

    /// Mark an ingestion that was stopped before finishing as failed and resumable
    pub async fn record_interrupted(&self, course: &CourseId, chunks_stored: usize) -> CourseRagError {
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger
                .mark_failed(course.as_str(), chunks_stored, "Ingestion interrupted")
                .await
            {
                warn!("Could not record interruption for {}: {:#}", course, e);
            }
        }

        warn!(
            "Ingestion of course {} interrupted after {} chunks",
            course, chunks_stored
        );
        CourseRagError::Interrupted {
            course_id: course.to_string(),
            chunks_stored,
        }
    }

    #[inline]
    pub async fn answer_question(&self, course: &CourseId, question: &str) -> Result<String> {
        self.assistant.answer(course, question).await
    }

    /// Retrieval only, without asking the completion model
    #[inline]
    pub async fn search_course(
        &self,
        course: &CourseId,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<QueryResult> {
        let top_k = top_k.unwrap_or_else(|| self.assistant.top_k()).max(1);
        self.assistant.retrieve(course, question, top_k).await
    }

    pub async fn course_index_info(&self, course: &CourseId) -> Result<CourseIndexInfo> {
        let collection_name = course.collection_name();
        let chunk_count = self.store.count(&collection_name).await?;
        let record = self.ledger_record(course).await;

        Ok(CourseIndexInfo {
            course_id: course.clone(),
            collection_name,
            chunk_count,
            record,
        })
    }

    /// Drop the course's collection and its ledger row
    pub async fn delete_course_index(&self, course: &CourseId) -> Result<()> {
        let deleted = self.store.delete_collection(&course.collection_name()).await;

        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.delete_course(course.as_str()).await {
                warn!("Could not remove ledger entry for {}: {:#}", course, e);
            }
        }

        deleted?;
        info!("Deleted index for course {}", course);
        Ok(())
    }

    /// Courses known to the vector store or the ledger, sorted by id
    pub async fn list_courses(&self) -> Result<Vec<CourseSummary>> {
        let mut courses: BTreeMap<String, CourseSummary> = BTreeMap::new();

        for name in self.store.list_collections().await? {
            if let Some(course) = CourseId::from_collection_name(&name) {
                courses.insert(
                    course.to_string(),
                    CourseSummary {
                        course_id: course.to_string(),
                        indexed: true,
                        status: None,
                        chunks_stored: None,
                        chunks_total: None,
                    },
                );
            }
        }

        if let Some(ledger) = &self.ledger {
            match ledger.list_courses().await {
                Ok(records) => {
                    for record in records {
                        let entry = courses
                            .entry(record.course_id.clone())
                            .or_insert_with(|| CourseSummary {
                                course_id: record.course_id.clone(),
                                indexed: false,
                                status: None,
                                chunks_stored: None,
                                chunks_total: None,
                            });
                        entry.status = Some(record.status);
                        entry.chunks_stored = Some(record.chunks_stored);
                        entry.chunks_total = Some(record.chunks_total);
                    }
                }
                Err(e) => warn!("Could not read the course ledger: {:#}", e),
            }
        }

        Ok(courses.into_values().collect())
    }

    #[inline]
    pub async fn health_check(&self) -> Result<()> {
        self.store.heartbeat().await
    }

    async fn ledger_record(&self, course: &CourseId) -> Option<CourseRecord> {
        let ledger = self.ledger.as_ref()?;
        match ledger.get_course(course.as_str()).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Could not read ledger entry for {}: {:#}", course, e);
                None
            }
        }
    }
}
