//! Error types for the prediction engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, PredictError>;

/// Main error type for the prediction engine.
///
/// Per the error taxonomy: input-contract violations and fatal failures are
/// represented here and propagated to callers. Degraded-data conditions
/// (insufficient evaluation samples) are also represented, since evaluation
/// must report them per regressor slot. Purely local fallbacks (singular
/// LWLR system, zero kernel denominator, imputation miss) are never
/// constructed as `PredictError` — they are silently skipped at the call
/// site per spec.
#[derive(Error, Debug)]
pub enum PredictError {
    /// The requested current time point is not one of the structure's
    /// configured time points.
    #[error("unknown time point: {0}")]
    UnknownTimePoint(String),

    /// The requested structure id has no corresponding `TeachingStructure`.
    #[error("unknown structure: {0}")]
    UnknownStructure(String),

    /// Fit or predict was attempted against an empty reference dataset.
    #[error("reference dataset is empty for structure {0}")]
    EmptyDataset(String),

    /// Fit was attempted with an empty feature-key list.
    #[error("feature key list is empty")]
    EmptyFeatureKeys,

    /// `assign` or `get_members` was called on an index that was never fitted.
    #[error("cluster index has not been fitted")]
    IndexNotFitted,

    /// Evaluation does not have enough valid samples to run.
    #[error("insufficient samples for evaluation: have {have}, need at least {need}")]
    InsufficientEvaluationData { have: usize, need: usize },

    /// The on-disk/cache index blob could not be decoded.
    #[error("failed to deserialize cached cluster index: {0}")]
    SerializationFailed(String),

    /// An unrecoverable failure (e.g. out-of-memory during fit, corrupt
    /// cached index that cannot be repaired by rebuilding).
    #[error("fatal engine error: {0}")]
    Fatal(String),

    /// JSON (de)serialization error surfaced from a store boundary.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PredictError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        PredictError::Fatal(msg.into())
    }
}
