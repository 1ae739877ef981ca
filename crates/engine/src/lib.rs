//! # Sparserec Engine
//!
//! Recommendation models over [`CsrMatrix`](sparserec_core::CsrMatrix)
//! interaction data.
//!
//! ## Modules
//!
//! - `als`: implicit-feedback ALS factorization with fold-in
//! - `similarity`: cosine, Jaccard, asymmetric cosine and P3alpha KNN similarities
//! - `evaluation`: ranking metrics against held-out interactions
//! - `learning_config`: validated ALS hyper-parameters and their builder

pub mod als;
pub mod evaluation;
pub mod learning_config;
pub mod similarity;

pub use als::ALSTrainer;
pub use evaluation::{Evaluator, Metrics, Recommendable};
pub use learning_config::{LearningConfig, LearningConfigBuilder};
pub use similarity::{
    AsymmetricCosineSimilarityComputer, CosineSimilarityComputer, JaccardSimilarityComputer,
    P3alphaComputer, SimilarityComputer,
};

#[cfg(test)]
mod tests;
