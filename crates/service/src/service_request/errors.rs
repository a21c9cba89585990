use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a record store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordStoreError {
    /// The backend signalled that an exact-match query matched no row.
    #[error("no rows matched")]
    NoRows,
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// The single error type surfaced by the service-request store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("service request {0} not found")]
    NotFound(Uuid),
    #[error("field `{0}` is immutable")]
    ImmutableField(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Backend(#[from] RecordStoreError),
}

impl PersistenceError {
    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            PersistenceError::NotFound(_) => 2001,
            PersistenceError::ImmutableField(_) => 2002,
            PersistenceError::InvalidInput(_) => 2003,
            PersistenceError::Backend(RecordStoreError::NoRows) => 2101,
            PersistenceError::Backend(RecordStoreError::Constraint(_)) => 2102,
            PersistenceError::Backend(RecordStoreError::Backend(_)) => 2100,
        }
    }
}
