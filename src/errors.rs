//! Error taxonomy for the streaming core.
//!
//! Nothing here is user-facing. Every condition travels back to the
//! orchestration layer as a typed value, which decides retry and alerting.

/// Errors surfaced by ingestion, analysis and memory tiering.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid data point: {reason}")]
    InvalidInput { reason: String },

    #[error("insufficient data: need {required} points, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("ingestion queue full: capacity {capacity}")]
    QueueFull { capacity: usize },

    #[error("memory pressure: {used_bytes} bytes in use, ceiling {ceiling_bytes}")]
    MemoryPressure { used_bytes: usize, ceiling_bytes: usize },

    #[error("analysis failure in {component}: {reason}")]
    AnalysisFailure { component: String, reason: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    /// Whether the caller should back off and try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::InsufficientData { .. }
                | PipelineError::QueueFull { .. }
                | PipelineError::MemoryPressure { .. }
                | PipelineError::Timeout { .. }
        )
    }

    pub fn analysis(component: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::AnalysisFailure {
            component: component.into(),
            reason: reason.into(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Persistent-tier errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("payload decompression failed: {reason}")]
    Decompression { reason: String },

    #[error("checksum mismatch for key {key}")]
    ChecksumMismatch { key: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Sqlite {
            message: err.to_string(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("configuration constraint violated: {0}")]
    Constraint(String),
}

/// Failure of a single forecasting estimator. Isolated to that estimator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimatorError {
    #[error("needs {needed} history points, got {available}")]
    NotEnoughHistory { needed: usize, available: usize },

    #[error("{estimator} produced a non-finite value")]
    NonFinite { estimator: String },

    #[error("degenerate input: {reason}")]
    Degenerate { reason: String },
}
