pub mod backends;
pub mod exploration;
pub mod features;
pub mod feedback;
pub mod fusion;
pub mod indexing;
pub mod ranking;
pub mod recall;
pub mod recommender;

pub use backends::{Backends, HashingEmbedder, InMemoryIndex};
pub use exploration::ContextualBandit;
pub use features::FeatureExtractor;
pub use feedback::FeedbackProcessor;
pub use fusion::RrfFuser;
pub use indexing::DualIndexer;
pub use ranking::RankingLayer;
pub use recall::HybridRetriever;
pub use recommender::{LessonRecommender, PipelineSettings, RecommendError};
