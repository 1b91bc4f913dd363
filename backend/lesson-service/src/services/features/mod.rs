// ============================================
// Feature Extractor
// ============================================
//
// Builds the fixed-schema FeatureVector for one (query, user, chunk) triple.
// Extraction is a pure function of its inputs: no I/O and no shared state.

pub mod tone;

pub use tone::{Emotion, LexiconToneMatcher, ToneMatcher, NEUTRAL_TONE_SCORE};

use crate::models::{Chunk, FeatureVector, ScoredHit, UserProfile};
use crate::utils::{cosine_similarity, normalize_score, VectorError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// `lex` for chunks that were only found by dense recall
pub const NO_LEXICAL_HIT: f32 = 0.5;

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("{side} vector has dimension {actual}, chunk {chunk_id} has {expected}")]
    DimensionMismatch {
        side: &'static str,
        chunk_id: String,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, FeatureError>;

/// Per-request query state shared by every candidate
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub text: String,
    /// None when the query could not be embedded
    pub query_vec: Option<Vec<f32>>,
    /// chunk id -> lexical score / top lexical score of this request
    pub lexical_scores: HashMap<String, f32>,
}

impl QueryContext {
    pub fn new(text: impl Into<String>, query_vec: Option<Vec<f32>>, lexical_hits: &[ScoredHit]) -> Self {
        let top = lexical_hits
            .iter()
            .map(|hit| hit.score)
            .fold(0.0_f32, f32::max);

        let lexical_scores = lexical_hits
            .iter()
            .map(|hit| (hit.chunk_id.clone(), normalize_score(hit.score, 0.0, top)))
            .collect();

        Self {
            text: text.into(),
            query_vec,
            lexical_scores,
        }
    }
}

pub struct FeatureExtractor {
    tone: Arc<dyn ToneMatcher>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(Arc::new(LexiconToneMatcher::new()))
    }
}

impl FeatureExtractor {
    pub fn new(tone: Arc<dyn ToneMatcher>) -> Self {
        Self { tone }
    }

    pub fn extract(
        &self,
        query: &QueryContext,
        profile: &UserProfile,
        chunk: &Chunk,
    ) -> Result<FeatureVector> {
        let sim = similarity("query", query.query_vec.as_deref(), chunk)?;

        let lex = query
            .lexical_scores
            .get(&chunk.id)
            .copied()
            .unwrap_or(NO_LEXICAL_HIT);

        let profile_vec = (!profile.is_cold()).then_some(profile.profile_vec.as_slice());
        let user = similarity("profile", profile_vec, chunk)?;

        let tone = self.tone.score(&query.text, &chunk.tone_tag).clamp(0.0, 1.0);

        Ok(FeatureVector {
            sim,
            lex,
            user,
            tone,
        })
    }

    /// Extract features for a batch, failing on the first invariant violation
    pub fn extract_all(
        &self,
        query: &QueryContext,
        profile: &UserProfile,
        chunks: &[Arc<Chunk>],
    ) -> Result<Vec<FeatureVector>> {
        chunks
            .iter()
            .map(|chunk| self.extract(query, profile, chunk))
            .collect()
    }
}

/// Cosine against the chunk's dense vector; 0 when either side is missing or zero
fn similarity(side: &'static str, vector: Option<&[f32]>, chunk: &Chunk) -> Result<f32> {
    let (Some(vector), Some(dense)) = (vector, chunk.dense_vec.as_deref()) else {
        return Ok(0.0);
    };

    match cosine_similarity(vector, dense) {
        Ok(sim) => Ok(sim),
        Err(VectorError::ZeroVector) => Ok(0.0),
        Err(VectorError::DimensionMismatch { left, right }) => Err(FeatureError::DimensionMismatch {
            side,
            chunk_id: chunk.id.clone(),
            expected: right,
            actual: left,
        }),
    }
}
