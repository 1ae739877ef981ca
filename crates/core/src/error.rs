//! Error types shared by every sparserec crate

use thiserror::Error;

/// Result type alias for sparserec operations
pub type Result<T> = std::result::Result<T, SparseRecError>;

/// Typed failures surfaced by matrix construction, training and similarity computation.
///
/// Every variant is raised eagerly at the boundary of the offending call, before
/// any state is mutated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SparseRecError {
    /// A parameter is outside its accepted domain (zero threads, bad ratio, ...)
    #[error("Invalid argument `{field}`: {message}")]
    InvalidArgument { message: String, field: String },

    /// Two operands (or a config and a matrix) disagree on a dimension
    #[error("Dimension mismatch: {message}")]
    DimensionMismatch { message: String },

    /// A row index points past the end of a matrix
    #[error("Index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    /// Persisted state does not have the expected arity or field kinds
    #[error("Malformed state: {0}")]
    MalformedState(String),

    /// A linear system could not be factorized
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// A worker pool could not be started
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Environment configuration could not be parsed
    #[error("Configuration error: {message}")]
    Configuration { message: String, key: Option<String> },
}

impl SparseRecError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            field: field.into(),
        }
    }

    pub fn dimension_mismatch(message: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            message: message.into(),
        }
    }

    pub fn malformed_state(message: impl Into<String>) -> Self {
        Self::MalformedState(message.into())
    }

    /// Error classification label, used as a structured logging field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::OutOfRange { .. } => "out_of_range",
            Self::MalformedState(_) => "malformed_state",
            Self::Numerical(_) => "numerical",
            Self::ThreadPool(_) => "thread_pool",
            Self::Configuration { .. } => "configuration",
        }
    }
}
