#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    CollectionHandle, CollectionMetadata, Document, DocumentMetadata, Include, QueryMatch,
    QueryOptions, QueryResult, VectorStore, uniform_dimension,
};
use crate::config::VectorStoreConfig;
use crate::http::{JsonClient, ProviderError, normalize_base_url};
use crate::{CourseRagError, Result};

const LIST_PAGE_SIZE: usize = 100;
const DISTANCE_SPACE_KEY: &str = "hnsw:space";
const DISTANCE_SPACE: &str = "cosine";

/// Vector store backed by a Chroma server's v2 REST API.
///
/// Chroma addresses collections by opaque id. Resolved name → handle mappings are
/// cached for the lifetime of the store and dropped on delete or when the server
/// answers 404 for a cached id.
#[derive(Debug)]
pub struct ChromaStore {
    base_url: String,
    api_root: String,
    http: JsonClient,
    handles: RwLock<HashMap<String, CollectionHandle>>,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    metadata: CollectionMetadata,
    get_or_create: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
    name: String,
    #[serde(default)]
    metadata: Option<CollectionMetadata>,
}

impl From<CollectionResponse> for CollectionHandle {
    #[inline]
    fn from(response: CollectionResponse) -> Self {
        Self {
            id: response.id,
            name: response.name,
            metadata: response.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    metadatas: Vec<&'a DocumentMetadata>,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: Vec<Include>,
}

/// Chroma returns one inner list per query embedding; only the first is used
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl ChromaStore {
    #[inline]
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let api_root = format!(
            "{}/api/v2/tenants/{}/databases/{}",
            base_url, config.tenant, config.database
        );

        debug!("Chroma API root: {}", api_root);

        Ok(Self {
            base_url,
            api_root,
            http: JsonClient::new(
                Duration::from_secs(config.timeout_secs),
                config.auth_token.clone(),
            ),
            handles: RwLock::new(HashMap::new()),
        })
    }

    fn collections_url(&self) -> String {
        format!("{}/collections", self.api_root)
    }

    fn collection_url(&self, handle: &CollectionHandle, action: &str) -> String {
        format!("{}/collections/{}{}", self.api_root, handle.id, action)
    }

    async fn cached(&self, name: &str) -> Option<CollectionHandle> {
        self.handles.read().await.get(name).cloned()
    }

    async fn remember(&self, handle: &CollectionHandle) {
        self.handles
            .write()
            .await
            .insert(handle.name.clone(), handle.clone());
    }

    async fn forget(&self, name: &str) {
        self.handles.write().await.remove(name);
    }

    async fn fetch_all_collections(&self) -> std::result::Result<Vec<CollectionResponse>, ProviderError> {
        let mut collections = Vec::new();
        let mut offset = 0;

        loop {
            let url = format!(
                "{}?limit={}&offset={}",
                self.collections_url(),
                LIST_PAGE_SIZE,
                offset
            );
            let page: Vec<CollectionResponse> = self.http.get(url).await?;
            let page_len = page.len();
            collections.extend(page);

            if page_len < LIST_PAGE_SIZE {
                return Ok(collections);
            }
            offset += page_len;
        }
    }

    /// Resolve a collection name to its handle, consulting the cache first
    async fn resolve(&self, name: &str) -> Result<CollectionHandle> {
        if let Some(handle) = self.cached(name).await {
            return Ok(handle);
        }

        debug!("Resolving Chroma collection '{}'", name);
        let collections = self
            .fetch_all_collections()
            .await
            .map_err(|source| CourseRagError::StoreQuery {
                collection: name.to_string(),
                source,
            })?;

        let handle: CollectionHandle = collections
            .into_iter()
            .find(|c| c.name == name)
            .map(Into::into)
            .ok_or_else(|| CourseRagError::CollectionNotFound(name.to_string()))?;

        self.remember(&handle).await;
        Ok(handle)
    }

    /// A 404 for a cached id means the collection was removed behind our back
    async fn not_found_or(
        &self,
        name: &str,
        source: ProviderError,
        wrap: fn(String, ProviderError) -> CourseRagError,
    ) -> CourseRagError {
        if source.is_not_found() {
            self.forget(name).await;
            CourseRagError::CollectionNotFound(name.to_string())
        } else {
            wrap(name.to_string(), source)
        }
    }
}

fn write_error(collection: String, source: ProviderError) -> CourseRagError {
    CourseRagError::StoreWrite { collection, source }
}

fn query_error(collection: String, source: ProviderError) -> CourseRagError {
    CourseRagError::StoreQuery { collection, source }
}

fn first_row<T>(rows: Option<Vec<Vec<T>>>) -> Vec<T> {
    rows.and_then(|r| r.into_iter().next()).unwrap_or_default()
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn create_or_get_collection(
        &self,
        name: &str,
        metadata: Option<CollectionMetadata>,
    ) -> Result<CollectionHandle> {
        let mut metadata = metadata.unwrap_or_default();
        metadata
            .entry(DISTANCE_SPACE_KEY.to_string())
            .or_insert_with(|| Value::String(DISTANCE_SPACE.to_string()));

        let request = CreateCollectionRequest {
            name,
            metadata,
            get_or_create: true,
        };

        let response: CollectionResponse = self
            .http
            .post(self.collections_url(), &request)
            .await
            .map_err(|source| write_error(name.to_string(), source))?;

        let handle: CollectionHandle = response.into();
        debug!("Collection '{}' resolved to id {}", handle.name, handle.id);
        self.remember(&handle).await;
        Ok(handle)
    }

    async fn upsert(&self, collection: &str, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        uniform_dimension(documents).map_err(|reason| {
            write_error(collection.to_string(), ProviderError::InvalidRequest(reason))
        })?;

        let handle = self.resolve(collection).await?;

        // Index i of every array describes documents[i]
        let request = UpsertRequest {
            ids: documents.iter().map(|d| d.id.as_str()).collect(),
            embeddings: documents.iter().map(|d| d.embedding.as_slice()).collect(),
            documents: documents.iter().map(|d| d.text.as_str()).collect(),
            metadatas: documents.iter().map(|d| &d.metadata).collect(),
        };

        if let Err(source) = self
            .http
            .post_discard(self.collection_url(&handle, "/upsert"), &request)
            .await
        {
            return Err(self.not_found_or(collection, source, write_error).await);
        }

        debug!("Upserted {} documents into '{}'", documents.len(), collection);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let handle = self.resolve(collection).await?;

        if options.top_k == 0 {
            return Ok(QueryResult::default());
        }

        let mut include: Vec<Include> = options
            .include
            .iter()
            .copied()
            .filter(|field| *field != Include::Embeddings)
            .collect();
        if !include.contains(&Include::Distances) {
            include.push(Include::Distances);
        }

        let request = QueryRequest {
            query_embeddings: [embedding],
            n_results: options.top_k,
            include,
        };

        let response: QueryResponse = match self
            .http
            .post(self.collection_url(&handle, "/query"), &request)
            .await
        {
            Ok(response) => response,
            Err(source) => return Err(self.not_found_or(collection, source, query_error).await),
        };

        let ids = response.ids.into_iter().next().unwrap_or_default();
        let mut documents = first_row(response.documents).into_iter();
        let mut metadatas = first_row(response.metadatas).into_iter();
        let mut distances = first_row(response.distances).into_iter();

        let matches = ids
            .into_iter()
            .map(|id| {
                let document = documents.next().flatten();
                let metadata = metadatas
                    .next()
                    .flatten()
                    .and_then(|value| serde_json::from_value::<DocumentMetadata>(value).ok());
                let distance = distances.next().flatten().unwrap_or(f32::MAX);

                QueryMatch::new(
                    id,
                    document.filter(|_| options.includes(Include::Documents)),
                    metadata.filter(|_| options.includes(Include::Metadatas)),
                    distance,
                )
            })
            .collect();

        Ok(QueryResult::from_matches(matches, options.top_k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let handle = self.resolve(collection).await?;

        match self.http.get(self.collection_url(&handle, "/count")).await {
            Ok(count) => Ok(count),
            Err(source) => Err(self.not_found_or(collection, source, query_error).await),
        }
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let handle = self.resolve(collection).await?;

        let outcome = self.http.delete(self.collection_url(&handle, "")).await;
        self.forget(collection).await;

        match outcome {
            Ok(()) => {
                info!("Deleted Chroma collection '{}'", collection);
                Ok(())
            }
            Err(source) if source.is_not_found() => {
                Err(CourseRagError::CollectionNotFound(collection.to_string()))
            }
            Err(source) => Err(write_error(collection.to_string(), source)),
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self
            .fetch_all_collections()
            .await
            .map_err(|source| query_error("*".to_string(), source))?;

        Ok(collections.into_iter().map(|c| c.name).collect())
    }

    async fn heartbeat(&self) -> Result<()> {
        let url = format!("{}/api/v2/healthcheck", self.base_url);
        self.http
            .get::<Value>(url)
            .await
            .map(|_| ())
            .map_err(|source| {
                warn!("Chroma health check failed: {}", source);
                query_error("healthcheck".to_string(), source)
            })
    }
}
