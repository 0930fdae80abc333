// Database module
// Vector collection stores (Chroma over REST, embedded LanceDB) and the SQLite course ledger


pub mod chroma;
pub mod lancedb;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::course::CourseId;

pub use chroma::ChromaStore;
pub use lancedb::LanceStore;

/// Free-form metadata attached to a collection
pub type CollectionMetadata = Map<String, Value>;

/// Metadata stored with every chunk document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub course_id: String,
    pub chunk_index: usize,
    /// Length of the chunk text in characters
    pub chunk_length: usize,
    pub created_at: DateTime<Utc>,
}

/// The stored unit: one embedded chunk
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Build the document for chunk `index` of a course, using its deterministic id
    #[inline]
    pub fn from_chunk(
        course: &CourseId,
        index: usize,
        text: String,
        embedding: Vec<f32>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let metadata = DocumentMetadata {
            course_id: course.to_string(),
            chunk_index: index,
            chunk_length: text.chars().count(),
            created_at,
        };

        Self {
            id: course.chunk_id(index),
            text,
            embedding,
            metadata,
        }
    }
}

/// A resolved collection: the provider's opaque id plus the name it was created with
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionHandle {
    pub id: String,
    pub name: String,
    pub metadata: Option<CollectionMetadata>,
}

/// Optional fields a query may return alongside ids and distances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Include {
    Documents,
    Metadatas,
    Distances,
    Embeddings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    pub include: Vec<Include>,
}

impl QueryOptions {
    #[inline]
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }

    #[inline]
    pub fn includes(&self, field: Include) -> bool {
        self.include.contains(&field)
    }
}

impl Default for QueryOptions {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 4,
            include: vec![Include::Documents, Include::Metadatas, Include::Distances],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub document: Option<String>,
    pub metadata: Option<DocumentMetadata>,
    /// Non-negative cosine distance
    pub distance: f32,
    /// `1 - distance`
    pub similarity: f32,
}

impl QueryMatch {
    #[inline]
    pub fn new(
        id: String,
        document: Option<String>,
        metadata: Option<DocumentMetadata>,
        distance: f32,
    ) -> Self {
        // Float error can produce tiny negative distances for identical vectors
        let distance = if distance.is_finite() {
            distance.max(0.0)
        } else {
            f32::MAX
        };

        Self {
            id,
            document,
            metadata,
            distance,
            similarity: 1.0 - distance,
        }
    }
}

/// Matches ordered by ascending distance, at most `top_k` of them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub matches: Vec<QueryMatch>,
}

impl QueryResult {
    #[inline]
    pub fn from_matches(mut matches: Vec<QueryMatch>, top_k: usize) -> Self {
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(top_k);
        Self { matches }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Document texts in similarity order, skipping matches without text
    #[inline]
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.matches.iter().filter_map(|m| m.document.as_deref())
    }
}

/// One isolated collection of documents per course.
///
/// Every operation resolves the collection by name; an unknown name fails with
/// [`CourseRagError::CollectionNotFound`](crate::CourseRagError::CollectionNotFound)
/// except for [`create_or_get_collection`](VectorStore::create_or_get_collection).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent: concurrent callers converge on a single collection
    async fn create_or_get_collection(
        &self,
        name: &str,
        metadata: Option<CollectionMetadata>,
    ) -> Result<CollectionHandle>;

    /// Insert or fully replace documents keyed by id
    async fn upsert(&self, collection: &str, documents: &[Document]) -> Result<()>;

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        options: &QueryOptions,
    ) -> Result<QueryResult>;

    async fn count(&self, collection: &str) -> Result<usize>;

    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Names of every collection in the store
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Cheap liveness check
    async fn heartbeat(&self) -> Result<()>;
}

/// Embeddings in one upsert must all have the same length
#[inline]
pub(crate) fn uniform_dimension(documents: &[Document]) -> std::result::Result<usize, String> {
    let Some(first) = documents.first() else {
        return Ok(0);
    };
    let dimension = first.embedding.len();

    match documents.iter().find(|d| d.embedding.len() != dimension) {
        Some(odd) => Err(format!(
            "document '{}' has {} dimensions, expected {}",
            odd.id,
            odd.embedding.len(),
            dimension
        )),
        None => Ok(dimension),
    }
}
