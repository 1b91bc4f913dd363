// ============================================
// Backend Capabilities
// ============================================
//
// The pipeline talks to embedding, lexical search, dense search and the
// chunk index only through these traits. Production deployments plug in
// remote services; tests and the standalone binary use the in-process
// implementations below.

pub mod embedding;
pub mod memory;

pub use embedding::HashingEmbedder;
pub use memory::InMemoryIndex;

use crate::models::{Chunk, ScoredHit};
use crate::services::indexing::LexicalQuery;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Nothing to embed: {0}")]
    EmptyInput(String),

    #[error("Dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl BackendError {
    /// Unavailability and timeouts degrade a request; everything else fails it
    pub fn is_degradable(&self) -> bool {
        !matches!(self, BackendError::DimensionMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Text -> dense vector
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of every vector this encoder returns
    fn dimension(&self) -> usize;

    /// Name for debugging and logging
    fn name(&self) -> &str;
}

#[async_trait]
pub trait LexicalBackend: Send + Sync {
    /// Top-k hits ranked by backend score, descending
    async fn search(&self, query: &LexicalQuery, top_k: usize) -> Result<Vec<ScoredHit>>;
}

#[async_trait]
pub trait DenseBackend: Send + Sync {
    /// Top-k hits ranked by similarity, descending. Dense-incomplete chunks never match.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredHit>>;
}

/// Index write path plus chunk lookup
///
/// `upsert` replaces the whole chunk value, so readers observe either the
/// previous or the new chunk.
pub trait ChunkStore: Send + Sync {
    fn upsert(&self, chunk: Arc<Chunk>);

    fn remove(&self, chunk_id: &str) -> Option<Arc<Chunk>>;

    fn get(&self, chunk_id: &str) -> Option<Arc<Chunk>>;

    fn chunks_for_lesson(&self, lesson_id: &str) -> Vec<Arc<Chunk>>;

    fn all(&self) -> Vec<Arc<Chunk>>;
}

/// Handles to every backend the pipeline needs
#[derive(Clone)]
pub struct Backends {
    pub embedder: Arc<dyn EmbeddingService>,
    pub lexical: Arc<dyn LexicalBackend>,
    pub dense: Arc<dyn DenseBackend>,
    pub store: Arc<dyn ChunkStore>,
}

impl Backends {
    /// One in-memory index serving as lexical backend, dense backend and store
    pub fn in_memory(embedder: Arc<dyn EmbeddingService>) -> Self {
        let index = Arc::new(InMemoryIndex::new());
        Self {
            embedder,
            lexical: index.clone(),
            dense: index.clone(),
            store: index,
        }
    }
}

/// Order hits by score descending, ties by chunk id, then cut to `top_k`
pub(crate) fn sort_and_truncate(mut hits: Vec<ScoredHit>, top_k: usize) -> Vec<ScoredHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(top_k);
    hits
}
