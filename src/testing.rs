// In-memory stand-ins for the provider traits, shared by unit tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::completion::{CompletionModel, CompletionRequest};
use crate::database::{
    CollectionHandle, CollectionMetadata, Document, Include, QueryMatch, QueryOptions, QueryResult,
    VectorStore, uniform_dimension,
};
use crate::embeddings::Embedder;
use crate::http::ProviderError;
use crate::{CourseRagError, Result};

pub const TEST_DIMENSION: usize = 8;

/// Deterministic bag-of-words embedder: identical texts give identical vectors
#[derive(Debug, Default)]
pub struct HashEmbedder {
    /// Texts containing this marker fail until `failures_left` reaches zero
    fail_marker: Mutex<Option<(String, usize)>>,
    /// Texts containing this marker never finish embedding
    hang_marker: Option<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: &str, times: usize) -> Self {
        let embedder = Self::default();
        *embedder.fail_marker.lock().expect("lock") = Some((marker.to_string(), times));
        embedder
    }

    pub fn hanging_on(marker: &str) -> Self {
        Self {
            hang_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; TEST_DIMENSION];
        for word in text.split_whitespace() {
            let bucket = word
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % TEST_DIMENSION;
            vector[bucket] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        vector
    }

    fn should_fail(&self, text: &str) -> bool {
        let mut marker = self.fail_marker.lock().expect("lock");
        match marker.as_mut() {
            Some((needle, remaining)) if *remaining > 0 && text.contains(needle.as_str()) => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .hang_marker
            .as_deref()
            .is_some_and(|marker| text.contains(marker))
        {
            std::future::pending::<()>().await;
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail(text) {
            return Err(CourseRagError::EmbeddingProvider(ProviderError::Status {
                status: 503,
                body: "embedding service unavailable".to_string(),
            }));
        }

        Ok(Self::vector_for(text))
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }
}

/// Vector store kept in memory, scoring by cosine distance
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Document>>>,
    creates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn ids(&self, collection: &str) -> Vec<String> {
        self.collections
            .lock()
            .expect("lock")
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .lock()
            .expect("lock")
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn create_or_get_collection(
        &self,
        name: &str,
        metadata: Option<CollectionMetadata>,
    ) -> Result<CollectionHandle> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.collections
            .lock()
            .expect("lock")
            .entry(name.to_string())
            .or_default();

        Ok(CollectionHandle {
            id: format!("mem-{}", name),
            name: name.to_string(),
            metadata,
        })
    }

    async fn upsert(&self, collection: &str, documents: &[Document]) -> Result<()> {
        uniform_dimension(documents).map_err(|reason| CourseRagError::StoreWrite {
            collection: collection.to_string(),
            source: ProviderError::InvalidRequest(reason),
        })?;

        let mut collections = self.collections.lock().expect("lock");
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| CourseRagError::CollectionNotFound(collection.to_string()))?;
        for document in documents {
            docs.insert(document.id.clone(), document.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let collections = self.collections.lock().expect("lock");
        let docs = collections
            .get(collection)
            .ok_or_else(|| CourseRagError::CollectionNotFound(collection.to_string()))?;

        let matches = docs
            .values()
            .map(|doc| {
                QueryMatch::new(
                    doc.id.clone(),
                    options
                        .includes(Include::Documents)
                        .then(|| doc.text.clone()),
                    options
                        .includes(Include::Metadatas)
                        .then(|| doc.metadata.clone()),
                    cosine_distance(embedding, &doc.embedding),
                )
            })
            .collect();

        Ok(QueryResult::from_matches(matches, options.top_k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.collections
            .lock()
            .expect("lock")
            .get(collection)
            .map(BTreeMap::len)
            .ok_or_else(|| CourseRagError::CollectionNotFound(collection.to_string()))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.collections
            .lock()
            .expect("lock")
            .remove(collection)
            .map(|_| ())
            .ok_or_else(|| CourseRagError::CollectionNotFound(collection.to_string()))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .lock()
            .expect("lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn heartbeat(&self) -> Result<()> {
        Ok(())
    }
}

/// Completion model that records requests and replies with a fixed text
#[derive(Debug)]
pub struct ScriptedCompletion {
    reply: String,
    fail: bool,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::replying("")
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().expect("lock").push(request.clone());

        if self.fail {
            return Err(CourseRagError::Completion(ProviderError::Status {
                status: 500,
                body: "model overloaded".to_string(),
            }));
        }

        Ok(self.reply.clone())
    }
}
