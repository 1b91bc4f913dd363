// ============================================
// Arm statistics and scoring
// ============================================
//
// UCB1 Formula:
//   UCB(i) = avg_reward(i) + c * sqrt(2 * ln(N) / n(i))
//
// Where:
//   - avg_reward(i): mean observed reward for arm i
//   - c: exploration constant (default: sqrt(2) ≈ 1.414)
//   - N: exposures across the candidate arms of this request
//   - n(i): exposures of arm i
//
// Thompson re-weighting uses the Beta posterior mean as a deterministic
// stand-in for a sample, so `select` stays reproducible.

use serde::Serialize;

pub const DEFAULT_EXPLORATION_CONSTANT: f64 = 1.414;

/// Score given to arms that were never exposed
const UNSEEN_ARM_SCORE: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ArmStats {
    pub exposures: u64,
    pub reward_sum: f64,
}

impl ArmStats {
    /// Fold one reward in [0, 1]
    pub fn record(&mut self, reward: f64) {
        self.exposures += 1;
        self.reward_sum += reward.clamp(0.0, 1.0);
    }

    pub fn alpha(&self) -> f64 {
        1.0 + self.reward_sum
    }

    pub fn beta(&self) -> f64 {
        1.0 + (self.exposures as f64 - self.reward_sum)
    }

    /// Beta(α, β) mean; 0.5 for a cold arm
    pub fn posterior_mean(&self) -> f64 {
        let alpha = self.alpha();
        alpha / (alpha + self.beta())
    }

    pub fn average_reward(&self) -> Option<f64> {
        (self.exposures > 0).then(|| self.reward_sum / self.exposures as f64)
    }

    /// UCB1 score clamped to [0, 1]
    pub fn ucb_score(&self, total_exposures: u64, exploration_constant: f64) -> f64 {
        let Some(exploit) = self.average_reward() else {
            return UNSEEN_ARM_SCORE;
        };

        let explore = if total_exposures > 0 {
            exploration_constant
                * ((2.0 * (total_exposures as f64).ln()) / self.exposures as f64).sqrt()
        } else {
            exploration_constant
        };

        (exploit + explore).clamp(0.0, 1.0)
    }
}
