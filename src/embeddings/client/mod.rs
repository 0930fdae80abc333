
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::embeddings::Embedder;
use crate::http::{JsonClient, ProviderError, normalize_base_url};
use crate::{CourseRagError, Result};

/// Client for a Nomic-style text embedding endpoint (`POST {base}/embedding/text`).
///
/// One text per request. No retries happen here; wrap the client in
/// [`RetryingEmbedder`](crate::embeddings::RetryingEmbedder) for that.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    endpoint: String,
    model: String,
    task_type: String,
    dimension: usize,
    http: JsonClient,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: [&'a str; 1],
    task_type: &'a str,
    dimensionality: usize,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let http = JsonClient::new(
            Duration::from_secs(config.timeout_secs),
            config.api_key.clone(),
        );

        if !http.has_credentials() {
            warn!(
                "No API key configured for embedding provider at {}",
                base_url
            );
        }

        Ok(Self {
            endpoint: format!("{}/embedding/text", base_url),
            model: config.model.clone(),
            task_type: config.task_type.clone(),
            dimension: config.dimension,
            http,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn extract_vector(&self, response: EmbedResponse) -> std::result::Result<Vec<f32>, ProviderError> {
        let vector = response.embeddings.into_iter().next().ok_or_else(|| {
            ProviderError::MalformedResponse("response contained no embeddings".to_string())
        })?;

        if vector.len() != self.dimension {
            return Err(ProviderError::MalformedResponse(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                vector.len()
            )));
        }

        if vector.iter().any(|v| !v.is_finite()) {
            return Err(ProviderError::MalformedResponse(
                "embedding contains non-finite values".to_string(),
            ));
        }

        Ok(vector)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.model,
            texts: [text],
            task_type: &self.task_type,
            dimensionality: self.dimension,
        };

        debug!(
            "Requesting embedding for {} characters from {}",
            text.chars().count(),
            self.model
        );

        let response: EmbedResponse = self
            .http
            .post(self.endpoint.clone(), &request)
            .await
            .map_err(CourseRagError::EmbeddingProvider)?;

        self.extract_vector(response)
            .map_err(CourseRagError::EmbeddingProvider)
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }
}
