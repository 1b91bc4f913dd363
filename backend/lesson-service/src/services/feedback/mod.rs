// ============================================
// Feedback Processor
// ============================================
//
// Turns observed interactions into bandit updates and profile updates.
// The processor is the only writer of user profile vectors.
//
// Profile rule (exponential moving average toward the chunk vector c):
//   α = learning_rate · reward
//   p ← (1 - α)·p + α·c
// A zero reward pushes away by `negative_rate`:
//   p ← p - negative_rate·(c - p)

pub mod profile_store;
pub mod served;

pub use profile_store::ProfileStore;
pub use served::ServedContexts;

use crate::models::{Chunk, FeedbackReport, Interaction};
use crate::services::backends::ChunkStore;
use crate::services::exploration::{BanditContext, BanditKeying, ContextualBandit};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_LEARNING_RATE: f64 = 0.2;

#[derive(Debug, Error, PartialEq)]
pub enum FeedbackError {
    #[error("User id must not be empty")]
    MissingUser,

    #[error("Interaction has an empty chunk id")]
    MissingChunkId,

    #[error("Reward for {chunk_id} must be in [0, 1], got {reward}")]
    InvalidReward { chunk_id: String, reward: f64 },

    #[error("No query given and {chunk_id} was never served to this user")]
    MissingContext { chunk_id: String },

    #[error("Profile of {user_id} has dimension {actual}, chunk {chunk_id} has {expected}")]
    DimensionMismatch {
        user_id: String,
        chunk_id: String,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, FeedbackError>;

#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    pub learning_rate: f64,
    /// 0 = a zero reward leaves the profile where it is
    pub negative_rate: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            negative_rate: 0.0,
        }
    }
}

pub struct FeedbackProcessor {
    bandit: Arc<ContextualBandit>,
    store: Arc<dyn ChunkStore>,
    profiles: Arc<ProfileStore>,
    served: Arc<ServedContexts>,
    config: FeedbackConfig,
}

impl FeedbackProcessor {
    pub fn new(
        bandit: Arc<ContextualBandit>,
        store: Arc<dyn ChunkStore>,
        profiles: Arc<ProfileStore>,
        served: Arc<ServedContexts>,
        config: FeedbackConfig,
    ) -> Self {
        Self {
            bandit,
            store,
            profiles,
            served,
            config,
        }
    }

    /// Apply a batch of interactions for one user
    ///
    /// The batch is all-or-nothing: it is validated and the new profile is
    /// computed before any statistics change. `query` keys context arms;
    /// without it each chunk falls back to the query it was last served for.
    pub fn process(
        &self,
        user_id: &str,
        interactions: &[Interaction],
        query: Option<&str>,
    ) -> Result<FeedbackReport> {
        validate(user_id, interactions)?;
        if interactions.is_empty() {
            return Ok(FeedbackReport::default());
        }

        let mut resolved = Vec::with_capacity(interactions.len());
        for interaction in interactions {
            let chunk = self.resolve(&interaction.chunk_id);
            let arm_id = chunk
                .as_ref()
                .map(|c| c.id.clone())
                .unwrap_or_else(|| interaction.chunk_id.clone());
            let context = self.context_for(user_id, &arm_id, query)?;
            resolved.push((interaction, chunk, arm_id, context));
        }

        let handle = self.profiles.handle(user_id);
        let mut profile = handle.lock();

        let mut next = profile.profile_vec.clone();
        let mut arms = Vec::with_capacity(interactions.len());
        let mut profile_updates = 0;

        for (interaction, chunk, arm_id, context) in resolved {
            if let Some(dense) = chunk.as_ref().and_then(|c| c.dense_vec.as_deref()) {
                let moved = self
                    .pull(&mut next, dense, interaction.reward)
                    .map_err(|actual| FeedbackError::DimensionMismatch {
                        user_id: user_id.to_string(),
                        chunk_id: arm_id.clone(),
                        expected: dense.len(),
                        actual,
                    })?;
                if moved {
                    profile_updates += 1;
                }
            } else {
                debug!(chunk_id = %arm_id, "No dense vector for chunk, profile unchanged");
            }

            arms.push((arm_id, context, interaction.reward));
        }

        for (arm_id, context, reward) in &arms {
            self.bandit.update(context, arm_id, *reward);
        }
        profile.profile_vec = next;

        info!(
            user_id = %user_id,
            applied = arms.len(),
            profile_updates = profile_updates,
            "Feedback applied"
        );

        Ok(FeedbackReport {
            applied: arms.len(),
            profile_updates,
        })
    }

    fn context_for(&self, user_id: &str, chunk_id: &str, query: Option<&str>) -> Result<BanditContext> {
        if let Some(query) = query {
            return Ok(BanditContext::new(user_id, query));
        }

        match self.served.lookup(user_id, chunk_id) {
            Some(served) => Ok(BanditContext::new(user_id, &served)),
            None if self.bandit.config().keying == BanditKeying::ContextChunk => {
                Err(FeedbackError::MissingContext {
                    chunk_id: chunk_id.to_string(),
                })
            }
            None => Ok(BanditContext::new(user_id, "")),
        }
    }

    /// Chunk id first; a bare lesson id resolves to that lesson's first chunk
    fn resolve(&self, id: &str) -> Option<Arc<Chunk>> {
        self.store
            .get(id)
            .or_else(|| self.store.chunks_for_lesson(id).into_iter().next())
    }

    /// Move `profile` for one reward. Err carries the profile's dimension on mismatch.
    fn pull(&self, profile: &mut Vec<f32>, chunk: &[f32], reward: f64) -> std::result::Result<bool, usize> {
        if profile.is_empty() {
            *profile = vec![0.0; chunk.len()];
        }
        if profile.len() != chunk.len() {
            return Err(profile.len());
        }

        if reward > 0.0 {
            let alpha = (self.config.learning_rate * reward) as f32;
            for (p, c) in profile.iter_mut().zip(chunk) {
                *p = (1.0 - alpha) * *p + alpha * c;
            }
            Ok(alpha > 0.0)
        } else if self.config.negative_rate > 0.0 {
            let beta = self.config.negative_rate as f32;
            for (p, c) in profile.iter_mut().zip(chunk) {
                *p -= beta * (c - *p);
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn validate(user_id: &str, interactions: &[Interaction]) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(FeedbackError::MissingUser);
    }

    for interaction in interactions {
        if interaction.chunk_id.trim().is_empty() {
            return Err(FeedbackError::MissingChunkId);
        }
        if !(0.0..=1.0).contains(&interaction.reward) {
            return Err(FeedbackError::InvalidReward {
                chunk_id: interaction.chunk_id.clone(),
                reward: interaction.reward,
            });
        }
    }

    Ok(())
}
