pub mod chain;
pub mod error;
pub mod pooling;
pub mod rank;
pub mod similarity;
pub mod transform;

pub use chain::{LabelScore, ScoreChain, ScoreStage};
pub use error::{Result, ScoringError};
pub use pooling::{l2_normalize, mean_pool};
pub use rank::{LabelMode, SortDescending, TopK};
pub use similarity::{average_vector, cosine_similarity, CentroidClassifier};
pub use transform::ScoreTransform;
