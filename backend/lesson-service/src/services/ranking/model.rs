/// Linear Ranking Model
///
/// Logistic scorer: `score = sigmoid(w · [sim, lex, user, tone] + bias)`,
/// evaluated for the whole batch as one matrix-vector product. Weights are
/// trained offline and shipped as a small JSON artifact.

use super::{Ranker, RankingError, Result};
use crate::models::FeatureVector;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearWeights {
    pub sim: f32,
    pub lex: f32,
    pub user: f32,
    pub tone: f32,
    #[serde(default)]
    pub bias: f32,
}

impl Default for LinearWeights {
    fn default() -> Self {
        Self {
            sim: 0.4,
            lex: 0.2,
            user: 0.3,
            tone: 0.1,
            bias: 0.0,
        }
    }
}

impl LinearWeights {
    fn as_array(&self) -> Array1<f32> {
        Array1::from(vec![self.sim, self.lex, self.user, self.tone])
    }

    fn validate(&self) -> Result<()> {
        let all = [self.sim, self.lex, self.user, self.tone, self.bias];
        if all.iter().all(|w| w.is_finite()) {
            Ok(())
        } else {
            Err(RankingError::InvalidInput(
                "Model weights must be finite".to_string(),
            ))
        }
    }
}

pub struct LinearRanker {
    weights: Array1<f32>,
    bias: f32,
}

impl Default for LinearRanker {
    fn default() -> Self {
        Self::from_weights(LinearWeights::default())
    }
}

impl LinearRanker {
    pub fn from_weights(weights: LinearWeights) -> Self {
        Self {
            weights: weights.as_array(),
            bias: weights.bias,
        }
    }

    /// Load weights from a JSON artifact
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        let raw = std::fs::read_to_string(path).map_err(|e| {
            RankingError::ModelLoadError(format!("{}: {}", path.display(), e))
        })?;
        let weights: LinearWeights = serde_json::from_str(&raw).map_err(|e| {
            RankingError::ModelLoadError(format!("{}: {}", path.display(), e))
        })?;
        weights.validate()?;

        debug!(path = %path.display(), "Loaded linear ranking model");
        Ok(Self::from_weights(weights))
    }
}

impl Ranker for LinearRanker {
    fn score(&self, features: &[FeatureVector]) -> Result<Vec<f32>> {
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let flat: Vec<f32> = features.iter().flat_map(|f| f.to_array()).collect();
        let matrix = Array2::from_shape_vec((features.len(), FeatureVector::LEN), flat)
            .map_err(|e| RankingError::InvalidInput(e.to_string()))?;

        let logits = matrix.dot(&self.weights) + self.bias;
        let scores: Vec<f32> = logits.iter().map(|z| sigmoid(*z)).collect();

        if let Some(bad) = scores.iter().position(|s| !s.is_finite()) {
            return Err(RankingError::InferenceError(format!(
                "Non-finite score for row {}",
                bad
            )));
        }

        Ok(scores)
    }

    fn name(&self) -> &str {
        "linear"
    }
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fv(sim: f32, lex: f32, user: f32, tone: f32) -> FeatureVector {
        FeatureVector {
            sim,
            lex,
            user,
            tone,
        }
    }

    #[test]
    fn test_scores_are_probabilities() {
        let ranker = LinearRanker::default();
        let scores = ranker
            .score(&[fv(1.0, 1.0, 1.0, 1.0), fv(-1.0, 0.0, -1.0, 0.0)])
            .unwrap();

        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_matches_hand_computed_logit() {
        let ranker = LinearRanker::from_weights(LinearWeights {
            sim: 1.0,
            lex: 2.0,
            user: 0.0,
            tone: -1.0,
            bias: 0.5,
        });

        let scores = ranker.score(&[fv(0.5, 0.25, 9.0, 1.0)]).unwrap();
        // 0.5 + 0.5 + 0 - 1.0 + 0.5 = 0.5
        assert!((scores[0] - sigmoid(0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_empty_batch() {
        assert!(LinearRanker::default().score(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_load_from_json() {
        let path = std::env::temp_dir().join(format!("linear-ranker-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"sim": 1.0, "lex": 0.0, "user": 0.0, "tone": 0.0}}"#).unwrap();

        let ranker = LinearRanker::load(&path).unwrap();
        let scores = ranker.score(&[fv(1.0, 0.0, 0.0, 0.0)]).unwrap();
        assert!((scores[0] - sigmoid(1.0)).abs() < 1e-6);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = LinearRanker::load("/nonexistent/model.json");
        assert!(matches!(result, Err(RankingError::ModelLoadError(_))));
    }
}
