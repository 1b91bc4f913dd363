use crate::services::exploration::{BanditConfig, BanditKeying, ExplorationPolicy};
use crate::services::feedback::FeedbackConfig;
use crate::services::indexing::ChunkerConfig;
use crate::services::PipelineSettings;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub retrieval: RetrievalConfig,
    pub ranking: RankingConfig,
    pub bandit: BanditEnvConfig,
    pub feedback: FeedbackEnvConfig,
}

/// `SERVICE_*`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_service_name")]
    pub name: String,
    /// JSON array of lessons indexed at startup
    pub lessons_path: Option<PathBuf>,
}

/// `RETRIEVAL_*`
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
    #[serde(default = "default_candidate_budget")]
    pub candidate_budget: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

/// `RANKING_*`
#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    /// JSON weights artifact; built-in weights when unset
    pub model_path: Option<PathBuf>,
}

/// `BANDIT_*`
#[derive(Debug, Clone, Deserialize)]
pub struct BanditEnvConfig {
    #[serde(default = "default_policy")]
    pub policy: String,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_exploration_constant")]
    pub exploration_constant: f64,
    #[serde(default = "default_keying")]
    pub keying: String,
    #[serde(default = "default_final_size")]
    pub final_size: usize,
}

/// `FEEDBACK_*`
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackEnvConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default)]
    pub negative_rate: f64,
}

fn default_http_port() -> u16 {
    8080
}
fn default_service_name() -> String {
    "lesson-service".to_string()
}
fn default_top_k() -> usize {
    100
}
fn default_rrf_k() -> usize {
    60
}
fn default_candidate_budget() -> usize {
    50
}
fn default_timeout_ms() -> u64 {
    500
}
fn default_embedding_dim() -> usize {
    64
}
fn default_max_chunk_chars() -> usize {
    800
}
fn default_policy() -> String {
    "thompson".to_string()
}
fn default_epsilon() -> f64 {
    0.1
}
fn default_seed() -> u64 {
    42
}
fn default_weight() -> f64 {
    0.2
}
fn default_exploration_constant() -> f64 {
    1.414
}
fn default_keying() -> String {
    "chunk".to_string()
}
fn default_final_size() -> usize {
    10
}
fn default_learning_rate() -> f64 {
    0.2
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build from explicit key/value pairs, as they would appear in the environment
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();

        let config = Config {
            service: envy::prefixed("SERVICE_").from_iter(vars.clone())?,
            retrieval: envy::prefixed("RETRIEVAL_").from_iter(vars.clone())?,
            ranking: envy::prefixed("RANKING_").from_iter(vars.clone())?,
            bandit: envy::prefixed("BANDIT_").from_iter(vars.clone())?,
            feedback: envy::prefixed("FEEDBACK_").from_iter(vars)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("RETRIEVAL_TOP_K", self.retrieval.top_k),
            ("RETRIEVAL_CANDIDATE_BUDGET", self.retrieval.candidate_budget),
            ("RETRIEVAL_TIMEOUT_MS", self.retrieval.timeout_ms as usize),
            ("RETRIEVAL_EMBEDDING_DIM", self.retrieval.embedding_dim),
            ("RETRIEVAL_MAX_CHUNK_CHARS", self.retrieval.max_chunk_chars),
            ("BANDIT_FINAL_SIZE", self.bandit.final_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }

        for (name, value) in [
            ("FEEDBACK_LEARNING_RATE", self.feedback.learning_rate),
            ("FEEDBACK_NEGATIVE_RATE", self.feedback.negative_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }

        self.bandit_config().map(|_| ())
    }

    pub fn bandit_config(&self) -> Result<BanditConfig, ConfigError> {
        let b = &self.bandit;
        let policy = match b.policy.trim().to_lowercase().as_str() {
            "greedy" => ExplorationPolicy::Greedy,
            "epsilon_greedy" => ExplorationPolicy::EpsilonGreedy {
                epsilon: b.epsilon,
                seed: b.seed,
            },
            "thompson" => ExplorationPolicy::Thompson { weight: b.weight },
            "ucb" => ExplorationPolicy::Ucb {
                weight: b.weight,
                exploration_constant: b.exploration_constant,
            },
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown BANDIT_POLICY '{}'",
                    other
                )))
            }
        };
        policy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let keying: BanditKeying = b
            .keying
            .parse()
            .map_err(|e: crate::services::exploration::ExplorationError| {
                ConfigError::Invalid(e.to_string())
            })?;

        Ok(BanditConfig {
            policy,
            keying,
            final_size: b.final_size,
        })
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings, ConfigError> {
        Ok(PipelineSettings {
            top_k: self.retrieval.top_k,
            rrf_k: self.retrieval.rrf_k,
            candidate_budget: self.retrieval.candidate_budget,
            backend_timeout: Duration::from_millis(self.retrieval.timeout_ms),
            chunker: ChunkerConfig {
                max_chunk_chars: self.retrieval.max_chunk_chars,
            },
            model_path: self.ranking.model_path.clone(),
            bandit: self.bandit_config()?,
            feedback: FeedbackConfig {
                learning_rate: self.feedback.learning_rate,
                negative_rate: self.feedback.negative_rate,
            },
        })
    }
}
