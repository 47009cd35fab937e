//! Index documents and their addressing.
//!
//! A document is the searchable projection of a primary record: the record
//! body plus an index-only `timestamp`. Granules are indexed as children of
//! their collection, so their address carries `parent = collection_id`.
//! Deleted granules leave a tombstone under the `deletedgranule` type with the
//! same id and parent.

use std::fmt;

use cirrus_storage::{RecordKey, RecordType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Index-only audit field stamped on every write.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Tombstone-only field recording when the live document was removed.
pub const DELETED_AT_FIELD: &str = "deletedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Execution,
    Granule,
    Pdr,
    #[serde(rename = "deletedgranule")]
    DeletedGranule,
}

impl DocType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocType::Execution => "execution",
            DocType::Granule => "granule",
            DocType::Pdr => "pdr",
            DocType::DeletedGranule => "deletedgranule",
        }
    }

    pub fn for_record_type(record_type: RecordType) -> Self {
        match record_type {
            RecordType::Execution => DocType::Execution,
            RecordType::Granule => DocType::Granule,
            RecordType::Pdr => DocType::Pdr,
        }
    }

    /// The record type of live documents; `None` for tombstones.
    pub fn record_type(self) -> Option<RecordType> {
        match self {
            DocType::Execution => Some(RecordType::Execution),
            DocType::Granule => Some(RecordType::Granule),
            DocType::Pdr => Some(RecordType::Pdr),
            DocType::DeletedGranule => None,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one document within an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocId {
    pub doc_type: DocType,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl DocId {
    pub fn new(doc_type: DocType, id: impl Into<String>, parent: Option<String>) -> Self {
        DocId {
            doc_type,
            id: id.into(),
            parent,
        }
    }

    /// The live document address of a record.
    pub fn for_key(key: &RecordKey) -> Self {
        DocId {
            doc_type: DocType::for_record_type(key.record_type()),
            id: key.natural_id().to_string(),
            parent: key.parent().map(str::to_string),
        }
    }

    /// The tombstone address of a record, for types that keep tombstones.
    pub fn tombstone_for(key: &RecordKey) -> Option<Self> {
        match key {
            RecordKey::Granule { .. } => Some(DocId {
                doc_type: DocType::DeletedGranule,
                ..DocId::for_key(key)
            }),
            _ => None,
        }
    }

    /// The record key a live document mirrors.
    ///
    /// `None` for tombstones and for granule documents without a parent.
    pub fn record_key(&self) -> Option<RecordKey> {
        match self.doc_type {
            DocType::Execution => Some(RecordKey::execution(&self.id)),
            DocType::Pdr => Some(RecordKey::pdr(&self.id)),
            DocType::Granule => self
                .parent
                .as_ref()
                .map(|collection| RecordKey::granule(&self.id, collection)),
            DocType::DeletedGranule => None,
        }
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{}/{} (parent {})", self.doc_type, self.id, parent),
            None => write!(f, "{}/{}", self.doc_type, self.id),
        }
    }
}

/// A stored document, as exported from or loaded into an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub index: String,
    pub id: DocId,
    pub body: Value,
}

/// Result of a create-or-replace write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

/// Result of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}
