use crate::document::DocId;

/// All errors that can be returned by an IndexBackend or the replicator.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Targeted update of a document that does not exist.
    #[error("document {id} not found in index '{index}'")]
    NotFound { index: String, id: DocId },

    /// A partial update with no fields.
    #[error("nothing to update")]
    NothingToUpdate,

    /// The cluster rejected the request under load or is unreachable.
    #[error("index unavailable: {0}")]
    Unavailable(String),

    /// A scroll token this backend did not issue, or one that expired.
    #[error("invalid scroll token: {0}")]
    InvalidScroll(String),

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A backend-specific error (mapping conflict, rejected write, etc.).
    #[error("index backend error: {0}")]
    Backend(String),
}

impl IndexError {
    /// Whether retrying the same call can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexError::Unavailable(_))
    }
}
