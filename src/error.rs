//! Error types for randomized PCA.
//!
//! Malformed input matrices are rejected eagerly with [`RandPcaError::InvalidMatrix`]
//! before any numerical work starts. Failures reported by the dense linear-algebra
//! backend during the factorization are wrapped in [`RandPcaError::Backend`].
//! Out-of-range scalar parameters are never errors; they are clamped instead.
use thiserror::Error;

/// A thread-safe boxed error, as produced by the linear-algebra backends.
pub type ThreadSafeStdError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why an input matrix was refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidMatrixReason {
    /// The matrix has no rows or no columns.
    #[error("matrix has zero rows or zero columns ({rows}x{cols})")]
    Empty { rows: usize, cols: usize },

    /// An entry is NaN or infinite.
    #[error("non-finite value {value} at ({row}, {col})")]
    NonFinite { row: usize, col: usize, value: f64 },

    /// An entry is negative while negative entries are being rejected.
    #[error("negative value {value} at ({row}, {col})")]
    Negative { row: usize, col: usize, value: f64 },
}

/// Represents all possible errors of a randomized PCA fit.
#[derive(Error, Debug)]
pub enum RandPcaError {
    /// The input matrix failed validation. No computation was attempted.
    #[error("invalid input matrix: {0}")]
    InvalidMatrix(#[from] InvalidMatrixReason),

    /// The dense backend failed while computing a decomposition.
    #[error("linear algebra backend failed during {stage}: {source}")]
    Backend {
        stage: &'static str,
        #[source]
        source: ThreadSafeStdError,
    },

    /// The random test matrix could not be seeded from the thread RNG.
    #[error("failed to initialize the random number generator: {0}")]
    RandomSource(#[from] rand::Error),
}

impl RandPcaError {
    pub(crate) fn backend(stage: &'static str) -> impl FnOnce(ThreadSafeStdError) -> Self {
        move |source| RandPcaError::Backend { stage, source }
    }

    /// Returns the validation failure if this is an `InvalidMatrix` error.
    pub fn invalid_matrix_reason(&self) -> Option<&InvalidMatrixReason> {
        match self {
            RandPcaError::InvalidMatrix(reason) => Some(reason),
            RandPcaError::Backend { .. } | RandPcaError::RandomSource(_) => None,
        }
    }
}
