use super::{LinearRanker, Ranker};
use crate::models::{Chunk, FeatureVector, RankedChunk};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ranked candidates plus whether the fallback ordering produced them
#[derive(Debug, Clone)]
pub struct RankingOutcome {
    pub ranked: Vec<RankedChunk>,
    pub degraded: bool,
}

/// Ranking Layer - 模型打分 + 降級排序
///
/// Without a usable model, candidates are ordered by `sim` descending.
pub struct RankingLayer {
    ranker: Option<Arc<dyn Ranker>>,
}

impl Default for RankingLayer {
    fn default() -> Self {
        Self::new(Arc::new(LinearRanker::default()))
    }
}

impl RankingLayer {
    pub fn new(ranker: Arc<dyn Ranker>) -> Self {
        Self {
            ranker: Some(ranker),
        }
    }

    /// No model at all: always use the fallback ordering
    pub fn heuristic() -> Self {
        debug!("Using sim-descending fallback ranking");
        Self { ranker: None }
    }

    /// Built-in weights when no artifact is configured, fallback ordering if it fails to load
    pub fn from_model_path(model_path: Option<&Path>) -> Self {
        let Some(path) = model_path else {
            return Self::default();
        };

        match LinearRanker::load(path) {
            Ok(ranker) => Self::new(Arc::new(ranker)),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load ranking model, falling back to sim ordering"
                );
                Self::heuristic()
            }
        }
    }

    /// No model is configured; a loaded model failing at inference shows up
    /// in `RankingOutcome::degraded` instead
    pub fn is_degraded(&self) -> bool {
        self.ranker.is_none()
    }

    /// 對候選集打分並按分數降序排序，同分按 chunk id
    pub fn predict_sorted(&self, candidates: Vec<(Arc<Chunk>, FeatureVector)>) -> Vec<RankedChunk> {
        self.rank(candidates).ranked
    }

    pub fn rank(&self, candidates: Vec<(Arc<Chunk>, FeatureVector)>) -> RankingOutcome {
        let features: Vec<FeatureVector> = candidates.iter().map(|(_, f)| *f).collect();
        let (scores, degraded) = self.model_scores(&features);

        let mut ranked: Vec<RankedChunk> = candidates
            .into_iter()
            .zip(scores)
            .map(|((chunk, features), score)| RankedChunk {
                chunk,
                features,
                score,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });

        RankingOutcome { ranked, degraded }
    }

    /// Scores and whether they came from the fallback
    fn model_scores(&self, features: &[FeatureVector]) -> (Vec<f32>, bool) {
        let fallback = || -> (Vec<f32>, bool) { (features.iter().map(|f| f.sim).collect(), true) };

        let Some(ranker) = &self.ranker else {
            return fallback();
        };

        match ranker.score(features) {
            Ok(scores) if scores.len() == features.len() => (scores, false),
            Ok(scores) => {
                warn!(
                    model = ranker.name(),
                    expected = features.len(),
                    actual = scores.len(),
                    "Ranker returned wrong number of scores, ranking degraded"
                );
                fallback()
            }
            Err(e) => {
                warn!(model = ranker.name(), error = %e, "Ranker failed, ranking degraded");
                fallback()
            }
        }
    }
}
