use super::{ArmStats, BanditConfig, BanditContext, ExplorationPolicy};
use crate::models::RankedChunk;
use crate::utils::stable_hash;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Contextual bandit with a sharded per-arm statistics store
///
/// `update` takes the write lock of one shard entry only, so concurrent
/// feedback on different arms never contends and no update is lost.
pub struct ContextualBandit {
    config: BanditConfig,
    arms: DashMap<String, ArmStats>,
}

impl Default for ContextualBandit {
    fn default() -> Self {
        Self::new(BanditConfig::default())
    }
}

impl ContextualBandit {
    pub fn new(config: BanditConfig) -> Self {
        Self {
            config,
            arms: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BanditConfig {
        &self.config
    }

    /// Decide the final exposed list from the ranker's order
    ///
    /// Read-only: identical state and arguments give identical output.
    pub fn select(&self, ranked: Vec<RankedChunk>, context: &BanditContext) -> Vec<RankedChunk> {
        let candidates = ranked.len();

        let mut selected = match &self.config.policy {
            ExplorationPolicy::Greedy => ranked,
            ExplorationPolicy::EpsilonGreedy { epsilon, seed } => {
                self.epsilon_swap(ranked, *epsilon, *seed, context)
            }
            ExplorationPolicy::Thompson { weight } => {
                let scores: Vec<f64> = ranked
                    .iter()
                    .map(|r| self.arm(context, &r.chunk.id).posterior_mean())
                    .collect();
                reweight(ranked, *weight, &scores)
            }
            ExplorationPolicy::Ucb {
                weight,
                exploration_constant,
            } => {
                let stats: Vec<ArmStats> = ranked
                    .iter()
                    .map(|r| self.arm(context, &r.chunk.id))
                    .collect();
                let total: u64 = stats.iter().map(|s| s.exposures).sum();
                let scores: Vec<f64> = stats
                    .iter()
                    .map(|s| s.ucb_score(total, *exploration_constant))
                    .collect();
                reweight(ranked, *weight, &scores)
            }
        };

        selected.truncate(self.config.final_size);

        debug!(
            policy = self.config.policy.name(),
            candidates = candidates,
            selected = selected.len(),
            "Bandit selection completed"
        );

        selected
    }

    /// Fold one observed reward into the arm's statistics
    pub fn update(&self, context: &BanditContext, chunk_id: &str, reward: f64) -> ArmStats {
        let key = context.arm_key(self.config.keying, chunk_id);
        let mut entry = self.arms.entry(key).or_default();
        entry.record(reward);
        *entry
    }

    /// Statistics of one arm, None if it was never updated
    pub fn stats(&self, context: &BanditContext, chunk_id: &str) -> Option<ArmStats> {
        let key = context.arm_key(self.config.keying, chunk_id);
        self.arms.get(&key).map(|entry| *entry.value())
    }

    pub fn arm_count(&self) -> usize {
        self.arms.len()
    }

    fn arm(&self, context: &BanditContext, chunk_id: &str) -> ArmStats {
        self.stats(context, chunk_id).unwrap_or_default()
    }

    fn epsilon_swap(
        &self,
        mut ranked: Vec<RankedChunk>,
        epsilon: f64,
        seed: u64,
        context: &BanditContext,
    ) -> Vec<RankedChunk> {
        let scope = format!("{}|{}", context.user_id, context.query);
        let mut rng = StdRng::seed_from_u64(seed ^ stable_hash(scope.as_bytes()));

        let n = ranked.len();
        let slots = self.config.final_size.min(n);
        for slot in 0..slots {
            if slot + 1 < n && rng.gen::<f64>() < epsilon {
                let swap_with = rng.gen_range(slot + 1..n);
                ranked.swap(slot, swap_with);
            }
        }

        ranked
    }
}

/// Blend rank position with per-arm scores: (1 - w)·prior + w·score
///
/// The prior falls linearly from 1 at the top of the ranked list. Ties keep
/// the ranker's order.
fn reweight(ranked: Vec<RankedChunk>, weight: f64, scores: &[f64]) -> Vec<RankedChunk> {
    let n = ranked.len();
    let mut blended: Vec<(f64, usize, RankedChunk)> = ranked
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            let prior = 1.0 - position as f64 / n as f64;
            let score = scores.get(position).copied().unwrap_or(0.5);
            ((1.0 - weight) * prior + weight * score, position, item)
        })
        .collect();

    blended.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });

    blended.into_iter().map(|(_, _, item)| item).collect()
}
