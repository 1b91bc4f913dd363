// ============================================
// Tone Matching
// ============================================
//
// Scores how well a chunk's tone tag suits the emotional intent behind a
// query. The default matcher infers intent from a keyword lexicon and looks
// the pair up in a fixed compatibility table.

use crate::services::indexing::tokenize;

/// Neutral score for unknown tags or undetectable intent
pub const NEUTRAL_TONE_SCORE: f32 = 0.5;

/// Pluggable tone-compatibility function
///
/// Implementations must be pure and return a value in [0, 1].
pub trait ToneMatcher: Send + Sync {
    fn score(&self, query: &str, tone_tag: &str) -> f32;

    /// Name for debugging and logging
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Anxious,
    Stressed,
    Sad,
    Angry,
    Happy,
    Tired,
    Neutral,
}

impl Emotion {
    const DETECTABLE: [Emotion; 6] = [
        Emotion::Anxious,
        Emotion::Stressed,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Happy,
        Emotion::Tired,
    ];

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Emotion::Anxious => &[
                "anxiety", "anxious", "worry", "worried", "panic", "fear", "nervous", "uneasy",
            ],
            Emotion::Stressed => &[
                "stress", "stressed", "pressure", "overwhelmed", "tense", "burnout",
            ],
            Emotion::Sad => &[
                "sad", "sadness", "grief", "lonely", "depressed", "down", "loss", "melancholy",
            ],
            Emotion::Angry => &[
                "anger", "angry", "frustrated", "frustration", "irritated", "annoyed",
            ],
            Emotion::Happy => &[
                "happy", "joy", "joyful", "grateful", "gratitude", "excited", "content",
            ],
            Emotion::Tired => &["tired", "exhausted", "fatigue", "fatigued", "drained", "sleep"],
            Emotion::Neutral => &[],
        }
    }

    /// Compatibility of a tone tag with this intent
    fn tone_affinity(&self, tone: &str) -> Option<f32> {
        let score = match (self, tone) {
            (Emotion::Anxious, "calming") => 1.0,
            (Emotion::Anxious, "grounding") => 0.8,
            (Emotion::Anxious, "reflective") => 0.5,
            (Emotion::Anxious, "uplifting") => 0.4,
            (Emotion::Anxious, "energizing") => 0.2,

            (Emotion::Stressed, "calming") => 1.0,
            (Emotion::Stressed, "grounding") => 0.9,
            (Emotion::Stressed, "reflective") => 0.5,
            (Emotion::Stressed, "uplifting") => 0.4,
            (Emotion::Stressed, "energizing") => 0.2,

            (Emotion::Sad, "uplifting") => 1.0,
            (Emotion::Sad, "reflective") => 0.7,
            (Emotion::Sad, "calming") => 0.6,
            (Emotion::Sad, "grounding") => 0.5,
            (Emotion::Sad, "energizing") => 0.4,

            (Emotion::Angry, "calming") => 0.9,
            (Emotion::Angry, "grounding") => 0.9,
            (Emotion::Angry, "reflective") => 0.6,
            (Emotion::Angry, "uplifting") => 0.3,
            (Emotion::Angry, "energizing") => 0.2,

            (Emotion::Happy, "uplifting") => 0.9,
            (Emotion::Happy, "reflective") => 0.8,
            (Emotion::Happy, "energizing") => 0.8,
            (Emotion::Happy, "grounding") => 0.5,
            (Emotion::Happy, "calming") => 0.5,

            (Emotion::Tired, "calming") => 0.8,
            (Emotion::Tired, "uplifting") => 0.7,
            (Emotion::Tired, "grounding") => 0.6,
            (Emotion::Tired, "reflective") => 0.5,
            (Emotion::Tired, "energizing") => 0.4,

            (Emotion::Neutral, "reflective") => 0.6,
            (Emotion::Neutral, "calming" | "grounding" | "uplifting" | "energizing") => 0.5,
            _ => return None,
        };
        Some(score)
    }
}

/// Keyword-lexicon intent detection + fixed compatibility table
#[derive(Debug, Clone, Default)]
pub struct LexiconToneMatcher;

impl LexiconToneMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Most frequent emotion among query keywords; earlier variants win ties
    pub fn infer_emotion(&self, query: &str) -> Emotion {
        let tokens = tokenize(query);
        let mut best = Emotion::Neutral;
        let mut best_hits = 0usize;

        for emotion in Emotion::DETECTABLE {
            let hits = tokens
                .iter()
                .filter(|t| emotion.keywords().contains(&t.as_str()))
                .count();
            if hits > best_hits {
                best = emotion;
                best_hits = hits;
            }
        }

        best
    }
}

impl ToneMatcher for LexiconToneMatcher {
    fn score(&self, query: &str, tone_tag: &str) -> f32 {
        let tone = tone_tag.trim().to_lowercase();
        self.infer_emotion(query)
            .tone_affinity(&tone)
            .unwrap_or(NEUTRAL_TONE_SCORE)
    }

    fn name(&self) -> &str {
        "lexicon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_emotion() {
        let matcher = LexiconToneMatcher::new();
        assert_eq!(matcher.infer_emotion("anxiety relief"), Emotion::Anxious);
        assert_eq!(matcher.infer_emotion("so tired and drained"), Emotion::Tired);
        assert_eq!(matcher.infer_emotion("prayer times"), Emotion::Neutral);
    }

    #[test]
    fn test_calming_suits_anxiety_best() {
        let matcher = LexiconToneMatcher::new();
        let calming = matcher.score("anxiety relief", "calming");
        let grounding = matcher.score("anxiety relief", "grounding");
        let reflective = matcher.score("anxiety relief", "reflective");

        assert_eq!(calming, 1.0);
        assert!(calming > grounding && grounding > reflective);
    }

    #[test]
    fn test_unknown_tag_is_neutral() {
        let matcher = LexiconToneMatcher::new();
        assert_eq!(matcher.score("anxiety", "whimsical"), NEUTRAL_TONE_SCORE);
        assert_eq!(matcher.score("anxiety", " Calming "), 1.0);
    }

    #[test]
    fn test_scores_stay_in_unit_range() {
        let matcher = LexiconToneMatcher::new();
        let queries = ["anxiety", "stress", "grief", "angry", "joy", "tired", "hello"];
        let tones = ["calming", "grounding", "reflective", "uplifting", "energizing", "x"];

        for q in queries {
            for t in tones {
                let s = matcher.score(q, t);
                assert!((0.0..=1.0).contains(&s), "{} / {} -> {}", q, t, s);
            }
        }
    }
}
