use super::{
    sort_and_truncate, BackendError, ChunkStore, DenseBackend, LexicalBackend, Result,
};
use crate::models::{Chunk, ScoredHit};
use crate::services::indexing::LexicalQuery;
use crate::utils::{cosine_similarity, VectorError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Brute-force in-process index
///
/// Holds published chunks keyed by id. Lexical search scores the BM25
/// vectors, dense search scans chunks that carry an embedding.
#[derive(Default)]
pub struct InMemoryIndex {
    chunks: DashMap<String, Arc<Chunk>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<Chunk>> {
        self.chunks.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl LexicalBackend for InMemoryIndex {
    async fn search(&self, query: &LexicalQuery, top_k: usize) -> Result<Vec<ScoredHit>> {
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let hits = self
            .snapshot()
            .into_iter()
            .filter_map(|chunk| {
                let score = query.score(&chunk.bm25_vec);
                (score > 0.0).then(|| ScoredHit::new(chunk.id.clone(), score))
            })
            .collect();

        Ok(sort_and_truncate(hits, top_k))
    }
}

#[async_trait]
impl DenseBackend for InMemoryIndex {
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for chunk in self.snapshot() {
            let Some(dense) = chunk.dense_vec.as_deref() else {
                continue;
            };

            match cosine_similarity(query, dense) {
                Ok(score) => hits.push(ScoredHit::new(chunk.id.clone(), score)),
                Err(VectorError::ZeroVector) => continue,
                Err(VectorError::DimensionMismatch { left, right }) => {
                    return Err(BackendError::DimensionMismatch {
                        expected: right,
                        actual: left,
                    });
                }
            }
        }

        Ok(sort_and_truncate(hits, top_k))
    }
}

impl ChunkStore for InMemoryIndex {
    fn upsert(&self, chunk: Arc<Chunk>) {
        self.chunks.insert(chunk.id.clone(), chunk);
    }

    fn remove(&self, chunk_id: &str) -> Option<Arc<Chunk>> {
        self.chunks.remove(chunk_id).map(|(_, chunk)| chunk)
    }

    fn get(&self, chunk_id: &str) -> Option<Arc<Chunk>> {
        self.chunks.get(chunk_id).map(|entry| entry.value().clone())
    }

    fn chunks_for_lesson(&self, lesson_id: &str) -> Vec<Arc<Chunk>> {
        let mut chunks: Vec<Arc<Chunk>> = self
            .chunks
            .iter()
            .filter(|entry| entry.value().lesson_id == lesson_id)
            .map(|entry| entry.value().clone())
            .collect();
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        chunks
    }

    fn all(&self) -> Vec<Arc<Chunk>> {
        let mut chunks = self.snapshot();
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        chunks
    }
}
