use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Lesson as ingested from the content catalog. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default = "default_tone_tag")]
    pub tone_tag: String,
}

fn default_tone_tag() -> String {
    "neutral".to_string()
}

/// Sparse lexical vector: term -> BM25 weight
pub type TermWeights = HashMap<String, f32>;

/// Retrievable sub-unit of a lesson
///
/// Chunks are published as `Arc<Chunk>` and replaced wholesale on re-indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub lesson_id: String,
    pub text: String,
    pub bm25_vec: TermWeights,
    /// None = dense-incomplete (embedding failed, awaiting backfill)
    pub dense_vec: Option<Vec<f32>>,
    pub tone_tag: String,
}

impl Chunk {
    pub fn is_dense_complete(&self) -> bool {
        self.dense_vec.is_some()
    }
}

/// Id given to requests that carry no profile
pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    /// Empty = cold user
    pub profile_vec: Vec<f32>,
    /// Lesson or chunk ids the user has already seen or completed
    #[serde(default)]
    pub history: Vec<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, profile_vec: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            profile_vec,
            history: Vec::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_USER, Vec::new())
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }

    pub fn is_cold(&self) -> bool {
        self.profile_vec.is_empty()
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS_USER
    }

    /// Whether a served chunk of `lesson_id` was already seen
    pub fn has_seen(&self, lesson_id: &str, chunk_id: &str) -> bool {
        self.history
            .iter()
            .any(|seen| seen == lesson_id || seen == chunk_id)
    }
}

/// Fixed-schema ranking features
///
/// - `sim`: cosine(query, chunk) in [-1, 1]
/// - `lex`: normalized lexical score in [0, 1] (0.5 when dense-only)
/// - `user`: cosine(profile, chunk) in [-1, 1]
/// - `tone`: tone compatibility in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub sim: f32,
    pub lex: f32,
    pub user: f32,
    pub tone: f32,
}

impl FeatureVector {
    pub const LEN: usize = 4;

    pub fn to_array(&self) -> [f32; Self::LEN] {
        [self.sim, self.lex, self.user, self.tone]
    }
}

/// Observed reward for a served chunk, in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub chunk_id: String,
    pub reward: f64,
}

impl Interaction {
    pub fn new(chunk_id: impl Into<String>, reward: f64) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            reward,
        }
    }
}

/// User actions reported by clients, mapped onto the reward scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionAction {
    Click,
    Like,
    Bookmark,
    View,
    Skip,
    Dismiss,
}

impl InteractionAction {
    pub fn reward(&self) -> f64 {
        match self {
            InteractionAction::Click | InteractionAction::Like | InteractionAction::Bookmark => 1.0,
            InteractionAction::View => 0.5,
            InteractionAction::Skip | InteractionAction::Dismiss => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    pub chunk_id: String,
    pub score: f32,
}

impl ScoredHit {
    pub fn new(chunk_id: impl Into<String>, score: f32) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecallSource {
    Lexical, // BM25 倒排召回
    Dense,   // 向量召回
}

impl RecallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecallSource::Lexical => "lexical",
            RecallSource::Dense => "dense",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub chunk_id: String,
    pub score: f64,
}

/// Candidate after feature extraction and model scoring
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: Arc<Chunk>,
    pub features: FeatureVector,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalStats {
    pub lexical_hits: usize,
    pub dense_hits: usize,
    pub fused_candidates: usize,
    pub degraded_sources: Vec<RecallSource>,
}

/// Summary of an `index_lessons` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub lessons: usize,
    pub chunks: usize,
    pub dense_incomplete: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackReport {
    pub applied: usize,
    pub profile_updates: usize,
}

/// Sample catalog used when no lessons file is configured
pub fn sample_lessons() -> Vec<Lesson> {
    vec![
        Lesson {
            id: "lesson1".to_string(),
            title: "Managing Anxiety Through Islamic Practices".to_string(),
            content: "Anxiety management techniques combined with Islamic wisdom...".to_string(),
            tone_tag: "calming".to_string(),
        },
        Lesson {
            id: "lesson2".to_string(),
            title: "The Science of Gratitude in Islamic Context".to_string(),
            content: "Scientific research on gratitude and its parallels in Islamic teachings..."
                .to_string(),
            tone_tag: "reflective".to_string(),
        },
        Lesson {
            id: "lesson3".to_string(),
            title: "Mindfulness and Khushoo in Prayer".to_string(),
            content: "How mindfulness techniques enhance spiritual connection in prayer..."
                .to_string(),
            tone_tag: "grounding".to_string(),
        },
    ]
}
