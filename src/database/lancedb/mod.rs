// LanceDB vector store
// Embedded backend: one table per course collection under the local vectors directory


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    CollectionHandle, CollectionMetadata, Document, DocumentMetadata, Include, QueryMatch,
    QueryOptions, QueryResult, VectorStore,
};
use crate::http::ProviderError;
use crate::{CourseRagError, Result};

/// Vector store backed by an embedded LanceDB database
pub struct LanceStore {
    connection: Connection,
    dimension: usize,
}

fn backend(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Backend(e.to_string())
}

fn write_error(collection: &str, source: ProviderError) -> CourseRagError {
    CourseRagError::StoreWrite {
        collection: collection.to_string(),
        source,
    }
}

fn query_error(collection: &str, source: ProviderError) -> CourseRagError {
    CourseRagError::StoreQuery {
        collection: collection.to_string(),
        source,
    }
}

impl LanceStore {
    /// Open (or create) the database directory; every vector must have `dimension` entries
    #[inline]
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            CourseRagError::Database(format!(
                "Failed to create vector database directory {}: {}",
                path.display(),
                e
            ))
        })?;

        let uri = path.to_string_lossy().to_string();
        debug!("Opening LanceDB at {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| CourseRagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self {
            connection,
            dimension,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("document", DataType::Utf8, false),
            Field::new("course_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("chunk_length", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(
        &self,
        collection: &str,
        wrap: fn(&str, ProviderError) -> CourseRagError,
    ) -> Result<Table> {
        match self.connection.open_table(collection).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                Err(CourseRagError::CollectionNotFound(collection.to_string()))
            }
            Err(e) => Err(wrap(collection, backend(e))),
        }
    }

    fn check_dimension(&self, id: &str, length: usize) -> std::result::Result<(), ProviderError> {
        if length == self.dimension {
            Ok(())
        } else {
            Err(ProviderError::InvalidRequest(format!(
                "'{}' has {} dimensions, collection expects {}",
                id, length, self.dimension
            )))
        }
    }

    fn record_batch(&self, documents: &[Document]) -> std::result::Result<RecordBatch, ProviderError> {
        let len = documents.len();
        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);
        let mut texts = Vec::with_capacity(len);
        let mut course_ids = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut chunk_lengths = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for document in documents {
            self.check_dimension(&document.id, document.embedding.len())?;

            ids.push(document.id.as_str());
            flat_values.extend_from_slice(&document.embedding);
            texts.push(document.text.as_str());
            course_ids.push(document.metadata.course_id.as_str());
            chunk_indices.push(to_u32(document.metadata.chunk_index)?);
            chunk_lengths.push(to_u32(document.metadata.chunk_length)?);
            created_ats.push(document.metadata.created_at.to_rfc3339());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vectors = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(backend)?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vectors),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(course_ids)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(UInt32Array::from(chunk_lengths)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(self.schema(), arrays).map_err(backend)
    }
}

fn to_u32(value: usize) -> std::result::Result<u32, ProviderError> {
    u32::try_from(value)
        .map_err(|_| ProviderError::InvalidRequest(format!("{} does not fit in u32", value)))
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> std::result::Result<&'a StringArray, ProviderError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| ProviderError::MalformedResponse(format!("missing string column {}", name)))
}

fn u32_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> std::result::Result<&'a UInt32Array, ProviderError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| ProviderError::MalformedResponse(format!("missing u32 column {}", name)))
}

fn parse_batch(
    batch: &RecordBatch,
    options: &QueryOptions,
) -> std::result::Result<Vec<QueryMatch>, ProviderError> {
    let ids = string_column(batch, "id")?;
    let documents = string_column(batch, "document")?;
    let course_ids = string_column(batch, "course_id")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;
    let chunk_lengths = u32_column(batch, "chunk_length")?;
    let created_ats = string_column(batch, "created_at")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| ProviderError::MalformedResponse("missing _distance column".to_string()))?;

    let mut matches = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let metadata = DateTime::parse_from_rfc3339(created_ats.value(row))
            .ok()
            .map(|created_at| DocumentMetadata {
                course_id: course_ids.value(row).to_string(),
                chunk_index: chunk_indices.value(row) as usize,
                chunk_length: chunk_lengths.value(row) as usize,
                created_at: created_at.with_timezone(&Utc),
            });

        let distance = if distances.is_null(row) {
            f32::MAX
        } else {
            distances.value(row)
        };

        matches.push(QueryMatch::new(
            ids.value(row).to_string(),
            options
                .includes(Include::Documents)
                .then(|| documents.value(row).to_string()),
            metadata.filter(|_| options.includes(Include::Metadatas)),
            distance,
        ));
    }

    Ok(matches)
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn create_or_get_collection(
        &self,
        name: &str,
        metadata: Option<CollectionMetadata>,
    ) -> Result<CollectionHandle> {
        let existing = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| write_error(name, backend(e)))?;

        if !existing.iter().any(|table| table == name) {
            match self
                .connection
                .create_empty_table(name, self.schema())
                .execute()
                .await
            {
                Ok(_) => info!("Created LanceDB table '{}'", name),
                // Lost a race with another creator; the table is there either way
                Err(lancedb::Error::TableAlreadyExists { .. }) => {}
                Err(e) => return Err(write_error(name, backend(e))),
            }
        }

        Ok(CollectionHandle {
            id: name.to_string(),
            name: name.to_string(),
            metadata,
        })
    }

    async fn upsert(&self, collection: &str, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let batch = self
            .record_batch(documents)
            .map_err(|source| write_error(collection, source))?;
        let table = self.open_table(collection, write_error).await?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| write_error(collection, backend(e)))?;

        debug!("Merged {} documents into '{}'", documents.len(), collection);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        self.check_dimension("query", embedding.len())
            .map_err(|source| query_error(collection, source))?;
        let table = self.open_table(collection, query_error).await?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| query_error(collection, backend(e)))?;
        if rows == 0 || options.top_k == 0 {
            return Ok(QueryResult::default());
        }

        let mut stream = table
            .vector_search(embedding)
            .map_err(|e| query_error(collection, backend(e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(options.top_k)
            .execute()
            .await
            .map_err(|e| query_error(collection, backend(e)))?;

        let mut matches = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| query_error(collection, backend(e)))?
        {
            matches.extend(
                parse_batch(&batch, options).map_err(|source| query_error(collection, source))?,
            );
        }

        Ok(QueryResult::from_matches(matches, options.top_k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let table = self.open_table(collection, query_error).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| query_error(collection, backend(e)))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let existing = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| write_error(collection, backend(e)))?;

        if !existing.iter().any(|table| table == collection) {
            return Err(CourseRagError::CollectionNotFound(collection.to_string()));
        }

        self.connection
            .drop_table(collection)
            .await
            .map_err(|e| write_error(collection, backend(e)))?;

        info!("Dropped LanceDB table '{}'", collection);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| query_error("*", backend(e)))
    }

    async fn heartbeat(&self) -> Result<()> {
        self.list_collections().await.map(|_| ())
    }
}
