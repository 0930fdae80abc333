
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::embeddings::Embedder;
use crate::{CourseRagError, Result};

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;

/// Retry policy applied around any [`Embedder`].
///
/// Only transient provider failures (transport errors, 429 and 5xx) are retried,
/// waiting `base_delay * 2^attempt` between tries.
#[derive(Debug, Clone)]
pub struct RetryingEmbedder<E> {
    inner: E,
    attempts: u32,
    base_delay: Duration,
}

impl<E: Embedder> RetryingEmbedder<E> {
    #[inline]
    pub fn new(inner: E, attempts: u32) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    #[inline]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn should_retry(error: &CourseRagError) -> bool {
        matches!(error, CourseRagError::EmbeddingProvider(source) if source.is_transient())
    }
}

#[async_trait]
impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;

        loop {
            match self.inner.embed(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) if attempt + 1 < self.attempts && Self::should_retry(&e) => {
                    let delay = self.base_delay * EXPONENTIAL_BACKOFF_BASE.pow(attempt);
                    warn!(
                        "Embedding attempt {} of {} failed: {}. Retrying in {:?}",
                        attempt + 1,
                        self.attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}
