// burrow-core/src/error.rs
// Error taxonomy for the adapter core

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BurrowError>;

/// All errors the adapter core can surface
///
/// Translator errors (`InvalidCriteria`, `InvalidGroupBy`) are synchronous and
/// returned before the store is touched. `ConsistencyMismatch` is raised only
/// after a mutation has already been applied: it is a detection signal, not a
/// rollback.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// Malformed criteria that cannot be translated
    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    /// `groupBy` present without any accumulator directive
    #[error("cannot group without a calculation (sum/min/max/average)")]
    InvalidGroupBy,

    /// A compiled filter the store cannot evaluate
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Update criteria matched no records
    #[error("no records matched the given criteria")]
    NotFound,

    /// The store's reported affected-count diverged from the pre-operation
    /// snapshot; the mutation has partially happened
    #[error("consistency mismatch: expected {expected} affected records, store reported {actual}")]
    ConsistencyMismatch { expected: usize, actual: usize },

    /// Connection registered without an identity
    #[error("connection is missing an identity")]
    IdentityMissing,

    /// Connection identity already registered
    #[error("connection '{0}' is already registered")]
    IdentityDuplicate(String),

    #[error("connection '{0}' is not registered")]
    ConnectionNotFound(String),

    #[error("collection '{0}' is not registered")]
    CollectionNotFound(String),

    /// Unique index rejected a write
    #[error("unique constraint violated on field '{field}' for value {value}")]
    UniqueViolation { field: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
