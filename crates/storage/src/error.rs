use crate::record::RecordKey;

/// All errors that can be returned by a PrimaryStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No record with the given natural key.
    #[error("record not found: {key}")]
    NotFound { key: RecordKey },

    /// A multi-item transaction was rejected as a whole (capacity exceeded,
    /// conflicting writes, item limit). Nothing from it was applied.
    #[error("transaction of {items} items canceled: {reason}")]
    TransactionCanceled { items: usize, reason: String },

    /// The backend is shedding load. Safe to retry after a backoff.
    #[error("primary store throttled: {0}")]
    Throttled(String),

    /// A scan cursor that this store did not issue.
    #[error("invalid scan cursor: {0}")]
    InvalidCursor(String),

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether retrying the same call can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Throttled(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
