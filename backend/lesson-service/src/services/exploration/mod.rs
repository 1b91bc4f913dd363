// ============================================
// Exploration Module (探索模块)
// ============================================
//
// Contextual bandit over the ranker's output.
//
// Serving path: `select` re-orders / swaps the ranked list according to the
// configured policy and never writes state.
// Feedback path: `update` folds one reward into the arm's statistics under a
// per-key lock of a sharded map.
//
// Arm statistics follow a Beta-Bernoulli model:
//   α = 1 + Σ reward,  β = 1 + Σ (1 - reward)
// Cold arms sit at the neutral prior Beta(1, 1).

pub mod bandit;
pub mod ucb;

pub use bandit::ContextualBandit;
pub use ucb::ArmStats;

use crate::services::indexing::tokenize_unique;
use thiserror::Error;

/// Default size of the final exposed list
pub const DEFAULT_FINAL_SIZE: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ExplorationError {
    #[error("Invalid exploration policy: {0}")]
    InvalidPolicy(String),
}

pub type Result<T> = std::result::Result<T, ExplorationError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ExplorationPolicy {
    /// Pass the ranker's order through
    Greedy,
    /// Swap each slot with a lower-ranked candidate with probability `epsilon`
    EpsilonGreedy { epsilon: f64, seed: u64 },
    /// Blend rank position with the arm's Beta posterior mean
    Thompson { weight: f64 },
    /// Blend rank position with a UCB1 arm score
    Ucb { weight: f64, exploration_constant: f64 },
}

impl Default for ExplorationPolicy {
    fn default() -> Self {
        ExplorationPolicy::Thompson { weight: 0.2 }
    }
}

impl ExplorationPolicy {
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ExplorationError::InvalidPolicy(format!(
                    "{} must be in [0, 1], got {}",
                    name, v
                )))
            }
        };

        match self {
            ExplorationPolicy::Greedy => Ok(()),
            ExplorationPolicy::EpsilonGreedy { epsilon, .. } => unit("epsilon", *epsilon),
            ExplorationPolicy::Thompson { weight } => unit("weight", *weight),
            ExplorationPolicy::Ucb {
                weight,
                exploration_constant,
            } => {
                unit("weight", *weight)?;
                if exploration_constant.is_finite() && *exploration_constant >= 0.0 {
                    Ok(())
                } else {
                    Err(ExplorationError::InvalidPolicy(format!(
                        "exploration constant must be non-negative, got {}",
                        exploration_constant
                    )))
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExplorationPolicy::Greedy => "greedy",
            ExplorationPolicy::EpsilonGreedy { .. } => "epsilon_greedy",
            ExplorationPolicy::Thompson { .. } => "thompson",
            ExplorationPolicy::Ucb { .. } => "ucb",
        }
    }
}

/// How bandit statistics are keyed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BanditKeying {
    /// One arm per chunk, shared by all users
    #[default]
    Chunk,
    /// One arm per (user, chunk)
    UserChunk,
    /// One arm per (normalized query, chunk)
    ContextChunk,
}

impl std::str::FromStr for BanditKeying {
    type Err = ExplorationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chunk" => Ok(BanditKeying::Chunk),
            "user_chunk" => Ok(BanditKeying::UserChunk),
            "context_chunk" => Ok(BanditKeying::ContextChunk),
            other => Err(ExplorationError::InvalidPolicy(format!(
                "unknown bandit keying '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BanditConfig {
    pub policy: ExplorationPolicy,
    pub keying: BanditKeying,
    pub final_size: usize,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            policy: ExplorationPolicy::default(),
            keying: BanditKeying::default(),
            final_size: DEFAULT_FINAL_SIZE,
        }
    }
}

/// Request context the bandit keys and seeds on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BanditContext {
    pub user_id: String,
    /// Sorted unique query tokens joined by a space
    pub query: String,
}

impl BanditContext {
    pub fn new(user_id: impl Into<String>, query_text: &str) -> Self {
        let mut tokens = tokenize_unique(query_text);
        tokens.sort();

        Self {
            user_id: user_id.into(),
            query: tokens.join(" "),
        }
    }

    /// Stats key for one chunk under the given keying
    pub fn arm_key(&self, keying: BanditKeying, chunk_id: &str) -> String {
        match keying {
            BanditKeying::Chunk => chunk_id.to_string(),
            BanditKeying::UserChunk => format!("{}|{}", self.user_id, chunk_id),
            BanditKeying::ContextChunk => format!("{}|{}", self.query, chunk_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_normalizes_query() {
        let a = BanditContext::new("u1", "Anxiety relief, anxiety!");
        let b = BanditContext::new("u1", "relief ANXIETY");
        assert_eq!(a, b);
        assert_eq!(a.query, "anxiety relief");
    }

    #[test]
    fn test_arm_keys() {
        let ctx = BanditContext::new("u1", "calm");
        assert_eq!(ctx.arm_key(BanditKeying::Chunk, "a-0"), "a-0");
        assert_eq!(ctx.arm_key(BanditKeying::UserChunk, "a-0"), "u1|a-0");
        assert_eq!(ctx.arm_key(BanditKeying::ContextChunk, "a-0"), "calm|a-0");
    }

    #[test]
    fn test_policy_validation() {
        assert!(ExplorationPolicy::Greedy.validate().is_ok());
        assert!(ExplorationPolicy::EpsilonGreedy { epsilon: 1.5, seed: 1 }
            .validate()
            .is_err());
        assert!(ExplorationPolicy::Ucb {
            weight: 0.5,
            exploration_constant: -1.0
        }
        .validate()
        .is_err());
        assert!(ExplorationPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_keying_from_str() {
        assert_eq!("user_chunk".parse::<BanditKeying>(), Ok(BanditKeying::UserChunk));
        assert!("per_galaxy".parse::<BanditKeying>().is_err());
    }
}
