/// Ranking Module
///
/// Scores candidates from their FeatureVector and orders them.
///
/// # Architecture
/// - **Model Layer**: `Ranker` implementations (linear logistic scorer over ndarray)
/// - **Ranking Layer**: batch scoring, ordering, and the `sim`-descending fallback
///   used whenever the model is missing or fails
pub mod model;
pub mod simple;

pub use model::{LinearRanker, LinearWeights};
pub use simple::{RankingLayer, RankingOutcome};

use crate::models::FeatureVector;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Model inference failed: {0}")]
    InferenceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, RankingError>;

/// Learned scoring function over the fixed feature schema
///
/// Must be deterministic and return exactly one score per input row.
pub trait Ranker: Send + Sync {
    fn score(&self, features: &[FeatureVector]) -> Result<Vec<f32>>;

    /// Name for debugging and logging
    fn name(&self) -> &str;
}
