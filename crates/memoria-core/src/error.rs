//! Error taxonomy shared across the storage, embedding, and search layers.
//!
//! Every component classifies its own failures into this taxonomy rather than letting
//! driver errors (`rusqlite::Error`, `std::io::Error`, ...) leak past the component
//! boundary unclassified.

use thiserror::Error;

/// Top-level error type returned by `memoria-core` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MemoriaError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedding request timed out after {0:.1}s")]
    EmbeddingTimeout(f64),

    #[error("schema mismatch: expected dimension {expected}, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("operation timed out")]
    OperationTimeout,

    #[error("operation cancelled")]
    OperationCancelled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("config error: {0}")]
    Config(String),
}

impl MemoriaError {
    /// Whether a caller may reasonably retry this error after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MemoriaError::Storage(StorageError::Transient(_))
                | MemoriaError::EmbeddingUnavailable(_)
                | MemoriaError::EmbeddingTimeout(_)
                | MemoriaError::OperationTimeout
        )
    }

    /// A short hint surfaced to the calling LLM for transient failures, per the
    /// "no internal stack traces" rule — permanent errors surface their own cause string.
    pub fn user_hint(&self) -> Option<&'static str> {
        match self {
            MemoriaError::EmbeddingUnavailable(_) | MemoriaError::EmbeddingTimeout(_) => {
                Some("embedding service warming, retry shortly")
            }
            MemoriaError::Storage(StorageError::Transient(_)) => {
                Some("storage briefly unavailable, retry shortly")
            }
            _ => None,
        }
    }
}

/// Storage-layer errors, split into transient (retryable) and permanent.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("permanent storage error: {0}")]
    Permanent(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<deadpool_sqlite::PoolError> for StorageError {
    fn from(e: deadpool_sqlite::PoolError) -> Self {
        StorageError::Pool(e.to_string())
    }
}

impl From<deadpool_sqlite::InteractError> for StorageError {
    fn from(e: deadpool_sqlite::InteractError) -> Self {
        StorageError::Permanent(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MemoriaError>;
pub type StorageResult<T> = std::result::Result<T, StorageError>;
