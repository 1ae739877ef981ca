//! # Sparserec Core
//!
//! Shared building blocks for the sparserec recommender toolkit.
//!
//! ## Modules
//!
//! - `sparse`: row-compressed sparse interaction matrix
//! - `parallel`: per-call row-block worker pool
//! - `ops`: blocked sparse product, row-wise train/test split, BM25 and TF-IDF weighting
//! - `state`: minimal persisted state values
//! - `error`: error types
//! - `config`: environment configuration loading
//! - `observability`: structured logging setup

pub mod config;
pub mod error;
pub mod observability;
pub mod ops;
pub mod parallel;
pub mod sparse;
pub mod state;

// Re-export commonly used types
pub use config::{load_dotenv, parse_env_var, ConfigLoader};
pub use error::{Result, SparseRecError};
pub use observability::{init_logging, LogConfig, LogFormat};
pub use ops::{
    okapi_bm25_weight, parallel_sparse_product, tf_idf_weight, train_test_split_rowwise,
    RowAccumulator,
};
pub use parallel::{row_blocks, run_row_blocks};
pub use sparse::{CsrBuilder, CsrMatrix};
pub use state::{PersistentState, StateValue};
