// Embeddings module
// Sentence chunking plus the embedding provider client and its retry wrapper

pub mod chunking;
pub mod client;
pub mod retry;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{ChunkingConfig, DEFAULT_MAX_CHUNK_LENGTH, chunk_text};
pub use client::EmbeddingClient;
pub use retry::RetryingEmbedder;

/// Turns one unit of text into a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. Fails rather than returning a placeholder vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of every vector this embedder produces
    fn dimension(&self) -> usize;
}
