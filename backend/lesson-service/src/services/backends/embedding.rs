//! Feature-hashing embedder
//!
//! Deterministic bag-of-words projection into a fixed dimension. Stands in
//! for a neural encoder when none is configured; texts sharing vocabulary
//! land close together.

use super::{BackendError, EmbeddingService, Result};
use crate::services::indexing::tokenize;
use crate::utils::{normalize_in_place, stable_hash};
use async_trait::async_trait;

pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(BackendError::EmptyInput(text.chars().take(32).collect()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            let hash = stable_hash(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
        }

        // Opposite signs in one bucket can cancel out completely
        if vector.iter().all(|x| *x == 0.0) {
            return Err(BackendError::EmptyInput(text.chars().take(32).collect()));
        }

        normalize_in_place(&mut vector);
        Ok(vector)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{cosine_similarity, l2_norm};

    #[test]
    fn test_embedding_is_unit_length_and_deterministic() {
        let embedder = HashingEmbedder::new(32);
        let a = embedder.embed("calm breathing before prayer").unwrap();
        let b = embedder.embed("calm breathing before prayer").unwrap();

        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        assert!((l2_norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(256);
        let anchor = embedder.embed("anxiety relief breathing").unwrap();
        let near = embedder.embed("anxiety relief").unwrap();

        let sim = cosine_similarity(&anchor, &near).unwrap();
        assert!(sim > 0.5, "expected overlap, got {}", sim);
    }

    #[test]
    fn test_empty_text_is_rejected() {
        let embedder = HashingEmbedder::default();
        assert!(matches!(
            embedder.embed("?! ."),
            Err(BackendError::EmptyInput(_))
        ));
    }
}
