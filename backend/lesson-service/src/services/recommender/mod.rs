// ============================================
// Lesson Recommender
// ============================================
//
// Explicitly constructed pipeline context. Every handle (index, backends,
// ranker, bandit state, profiles) lives here, so separate instances never
// share state.
//
// Serving:  query → HybridRetriever → RrfFuser → FeatureExtractor
//                 → RankingLayer → ContextualBandit.select
// Feedback: interactions → FeedbackProcessor → bandit + profile updates

use crate::models::{
    FeedbackReport, IndexReport, Interaction, Lesson, RankedChunk, UserProfile,
};
use crate::services::backends::{Backends, HashingEmbedder};
use crate::services::exploration::{ArmStats, BanditConfig, BanditContext, ContextualBandit};
use crate::services::features::{FeatureError, FeatureExtractor, QueryContext};
use crate::services::feedback::{
    FeedbackConfig, FeedbackError, FeedbackProcessor, ProfileStore, ServedContexts,
};
use crate::services::fusion::{RrfFuser, DEFAULT_CANDIDATE_BUDGET, DEFAULT_RRF_K};
use crate::services::indexing::{ChunkerConfig, DualIndexer, IndexError, LessonChunker};
use crate::services::ranking::RankingLayer;
use crate::services::recall::{HybridRetriever, RetrievalError};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 100;
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),
}

impl RecommendError {
    /// Caller-side mistakes, as opposed to invariant violations
    pub fn is_client_error(&self) -> bool {
        match self {
            RecommendError::InvalidRequest(_) | RecommendError::Index(_) => true,
            RecommendError::Feedback(e) => !matches!(e, FeedbackError::DimensionMismatch { .. }),
            RecommendError::Retrieval(_) | RecommendError::Feature(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecommendError>;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub rrf_k: usize,
    pub candidate_budget: usize,
    /// Per-call bound for embedding and search backends
    pub backend_timeout: Duration,
    pub chunker: ChunkerConfig,
    pub model_path: Option<PathBuf>,
    pub bandit: BanditConfig,
    pub feedback: FeedbackConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            rrf_k: DEFAULT_RRF_K,
            candidate_budget: DEFAULT_CANDIDATE_BUDGET,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            chunker: ChunkerConfig::default(),
            model_path: None,
            bandit: BanditConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}

pub struct LessonRecommender {
    backends: Backends,
    indexer: DualIndexer,
    retriever: HybridRetriever,
    fuser: RrfFuser,
    extractor: FeatureExtractor,
    ranking: RankingLayer,
    bandit: Arc<ContextualBandit>,
    profiles: Arc<ProfileStore>,
    served: Arc<ServedContexts>,
    feedback: FeedbackProcessor,
    settings: PipelineSettings,
}

impl LessonRecommender {
    pub fn new(backends: Backends, settings: PipelineSettings) -> Self {
        let indexer = DualIndexer::new(
            LessonChunker::new(settings.chunker.clone()),
            backends.embedder.clone(),
            backends.store.clone(),
            settings.backend_timeout,
        );
        let retriever = HybridRetriever::new(
            backends.embedder.clone(),
            backends.lexical.clone(),
            backends.dense.clone(),
            settings.backend_timeout,
        );
        let bandit = Arc::new(ContextualBandit::new(settings.bandit.clone()));
        let profiles = Arc::new(ProfileStore::new());
        let served = Arc::new(ServedContexts::new());
        let feedback = FeedbackProcessor::new(
            bandit.clone(),
            backends.store.clone(),
            profiles.clone(),
            served.clone(),
            settings.feedback.clone(),
        );

        Self {
            indexer,
            retriever,
            fuser: RrfFuser::new(settings.rrf_k, settings.candidate_budget),
            extractor: FeatureExtractor::default(),
            ranking: RankingLayer::from_model_path(settings.model_path.as_deref()),
            bandit,
            profiles,
            served,
            feedback,
            backends,
            settings,
        }
    }

    /// Standalone instance: hashing embedder over one in-memory index
    pub fn in_memory(embedding_dim: usize, settings: PipelineSettings) -> Self {
        let embedder = Arc::new(HashingEmbedder::new(embedding_dim));
        Self::new(Backends::in_memory(embedder), settings)
    }

    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_ranking(mut self, ranking: RankingLayer) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn lesson_count(&self) -> usize {
        self.indexer.lesson_count()
    }

    // ============================================
    // Index
    // ============================================

    pub async fn index_lessons(&self, lessons: Vec<Lesson>) -> Result<IndexReport> {
        Ok(self.indexer.index_lessons(lessons).await?)
    }

    pub async fn remove_lesson(&self, lesson_id: &str) -> usize {
        self.indexer.remove_lesson(lesson_id).await
    }

    pub async fn backfill_embeddings(&self) -> usize {
        self.indexer.backfill_embeddings().await
    }

    // ============================================
    // Serving
    // ============================================

    /// Final exposed chunks for a query, in bandit-selected order
    pub async fn retrieve_and_rank(
        &self,
        query: &str,
        profile: &UserProfile,
    ) -> Result<Vec<RankedChunk>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RecommendError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let retrieval = self.retriever.retrieve(query, self.settings.top_k).await?;
        let fused = self.fuser.fuse(&[
            retrieval.lexical_hits.as_slice(),
            retrieval.dense_hits.as_slice(),
        ]);

        let query_ctx = QueryContext::new(query, retrieval.query_vec, &retrieval.lexical_hits);

        let mut candidates = Vec::with_capacity(fused.len());
        for candidate in &fused {
            let Some(chunk) = self.backends.store.get(&candidate.chunk_id) else {
                debug!(chunk_id = %candidate.chunk_id, "Fused candidate no longer indexed");
                continue;
            };
            let features = self.extractor.extract(&query_ctx, profile, &chunk)?;
            candidates.push((chunk, features));
        }

        let ranking = self.ranking.rank(candidates);
        let context = BanditContext::new(profile.id.as_str(), query);
        let selected = self.bandit.select(ranking.ranked, &context);

        for served in &selected {
            self.served.record(&profile.id, &served.chunk.id, query);
        }

        info!(
            user_id = %profile.id,
            lexical_hits = retrieval.stats.lexical_hits,
            dense_hits = retrieval.stats.dense_hits,
            fused_candidates = fused.len(),
            selected = selected.len(),
            degraded_sources = retrieval.stats.degraded_sources.len(),
            ranking_degraded = ranking.degraded,
            "Recommendation served"
        );

        Ok(selected)
    }

    /// Lessons for a query, one per lesson, in final rank order
    ///
    /// A stored profile with a non-empty vector takes precedence over the
    /// vector supplied by the caller; requests without a profile stay
    /// anonymous. Lessons in the profile's history move below every unseen
    /// lesson, keeping the bandit's order within each group.
    pub async fn recommend_lessons(
        &self,
        query: &str,
        profile: Option<UserProfile>,
    ) -> Result<Vec<Lesson>> {
        let profile = match profile {
            Some(requested) => self.effective_profile(requested),
            None => UserProfile::anonymous(),
        };
        let ranked = self.retrieve_and_rank(query, &profile).await?;

        let (fresh, seen_before): (Vec<RankedChunk>, Vec<RankedChunk>) = ranked
            .into_iter()
            .partition(|r| !profile.has_seen(&r.chunk.lesson_id, &r.chunk.id));
        if !seen_before.is_empty() {
            debug!(demoted = seen_before.len(), "Demoted already seen lessons");
        }

        let mut seen = HashSet::new();
        let lessons = fresh
            .iter()
            .chain(&seen_before)
            .filter(|r| seen.insert(r.chunk.lesson_id.clone()))
            .filter_map(|r| self.indexer.lesson(&r.chunk.lesson_id))
            .take(self.settings.bandit.final_size)
            .collect();

        Ok(lessons)
    }

    /// The shared anonymous id never picks up a stored profile
    fn effective_profile(&self, requested: UserProfile) -> UserProfile {
        if requested.is_anonymous() {
            return requested;
        }
        match self.profiles.get(&requested.id) {
            Some(stored) if !stored.is_cold() => UserProfile {
                history: requested.history,
                ..stored
            },
            _ => requested,
        }
    }

    // ============================================
    // Feedback
    // ============================================

    pub fn update_feedback(
        &self,
        user_id: &str,
        interactions: &[Interaction],
        query: Option<&str>,
    ) -> Result<FeedbackReport> {
        Ok(self.feedback.process(user_id, interactions, query)?)
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.get(user_id)
    }

    /// Bandit statistics for one chunk as seen from a user/query context
    pub fn arm_stats(&self, user_id: &str, query: &str, chunk_id: &str) -> Option<ArmStats> {
        self.bandit.stats(&BanditContext::new(user_id, query), chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sample_lessons, ANONYMOUS_USER};

    async fn recommender() -> LessonRecommender {
        let r = LessonRecommender::in_memory(64, PipelineSettings::default());
        r.index_lessons(sample_lessons()).await.unwrap();
        r
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let r = recommender().await;
        let err = r
            .retrieve_and_rank("   ", &UserProfile::anonymous())
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendError::InvalidRequest(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_recommend_dedupes_lessons() {
        let r = recommender().await;
        let lessons = r.recommend_lessons("anxiety prayer gratitude", None).await.unwrap();

        let ids: HashSet<&str> = lessons.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids.len(), lessons.len());
        assert!(lessons.len() <= 10);
        assert!(!lessons.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_profile_dimension_fails_request() {
        let r = recommender().await;
        let profile = UserProfile::new("u1", vec![1.0, 0.0, 0.0]);

        let err = r.retrieve_and_rank("anxiety", &profile).await.unwrap_err();
        assert!(matches!(err, RecommendError::Feature(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_stored_profile_takes_precedence() {
        let r = recommender().await;
        r.update_feedback("u1", &[Interaction::new("lesson3-0", 1.0)], None)
            .unwrap();

        let requested = UserProfile::new("u1", vec![]);
        let effective = r.effective_profile(requested);
        assert!(!effective.is_cold());

        let other = r.effective_profile(UserProfile::new("u2", vec![0.5; 64]));
        assert_eq!(other.profile_vec, vec![0.5; 64]);
    }

    #[tokio::test]
    async fn test_anonymous_requests_ignore_stored_anonymous_profile() {
        let r = recommender().await;
        r.update_feedback(ANONYMOUS_USER, &[Interaction::new("lesson3-0", 1.0)], None)
            .unwrap();
        assert!(!r.profile(ANONYMOUS_USER).unwrap().is_cold());

        assert!(r.effective_profile(UserProfile::anonymous()).is_cold());
        let lessons = r.recommend_lessons("anxiety relief", None).await.unwrap();
        assert_eq!(lessons[0].id, "lesson1");
    }

    #[tokio::test]
    async fn test_seen_lessons_move_below_unseen() {
        let r = recommender().await;
        let fresh = r.recommend_lessons("anxiety relief", None).await.unwrap();
        assert_eq!(fresh[0].id, "lesson1");

        let profile = UserProfile::new("u7", vec![]).with_history(vec!["lesson1".to_string()]);
        let lessons = r
            .recommend_lessons("anxiety relief", Some(profile))
            .await
            .unwrap();

        assert_eq!(lessons.len(), fresh.len());
        assert_eq!(lessons.last().map(|l| l.id.as_str()), Some("lesson1"));
        let unseen: Vec<&str> = fresh.iter().map(|l| l.id.as_str()).filter(|id| *id != "lesson1").collect();
        let head: Vec<&str> = lessons[..lessons.len() - 1].iter().map(|l| l.id.as_str()).collect();
        assert_eq!(head, unseen);
    }

    #[tokio::test]
    async fn test_history_survives_stored_profile() {
        let r = recommender().await;
        r.update_feedback("u1", &[Interaction::new("lesson3-0", 1.0)], None)
            .unwrap();

        let effective = r.effective_profile(
            UserProfile::new("u1", vec![]).with_history(vec!["lesson2-0".to_string()]),
        );
        assert!(!effective.is_cold());
        assert!(effective.has_seen("lesson2", "lesson2-0"));
    }

    #[tokio::test]
    async fn test_served_chunks_remember_their_query() {
        let r = recommender().await;
        let ranked = r
            .retrieve_and_rank("gratitude", &UserProfile::new("u5", vec![]))
            .await
            .unwrap();

        for served in &ranked {
            assert_eq!(
                r.served.lookup("u5", &served.chunk.id).as_deref(),
                Some("gratitude")
            );
        }
    }
}

