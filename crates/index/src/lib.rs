//! cirrus-index: the searchable mirror of the primary store.
//!
//! [`IndexBackend`] abstracts the search engine; [`MemoryIndex`] is the
//! in-process implementation. [`IndexReplicator`] is the single component
//! allowed to write documents, and owns the tombstone rules for granules.

mod backend;
mod document;
mod error;
mod memory;
mod query;
mod replicator;

pub use backend::{scroll_all, IndexBackend};
pub use document::{
    DeleteOutcome, DocId, DocType, IndexDocument, WriteOutcome, DELETED_AT_FIELD,
    TIMESTAMP_FIELD,
};
pub use error::IndexError;
pub use memory::MemoryIndex;
pub use query::{
    RangeFilter, ScrollToken, SearchHit, SearchQuery, SearchResponse, Sort, SortOrder,
};
pub use replicator::{IndexReplicator, DEFAULT_INDEX};
