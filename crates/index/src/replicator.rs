//! The only writer of the search index.
//!
//! Every index mutation in the system goes through [`IndexReplicator`], which
//! keeps two rules: a live granule document and its tombstone never coexist,
//! and every write is stamped with an audit `timestamp`.

use std::sync::Arc;

use cirrus_storage::clock::now_millis;
use cirrus_storage::{Record, RecordKey};
use serde_json::{Map, Value};

use crate::backend::IndexBackend;
use crate::document::{DeleteOutcome, DocId, WriteOutcome, DELETED_AT_FIELD, TIMESTAMP_FIELD};
use crate::error::IndexError;

/// Alias the replicator targets unless told otherwise.
pub const DEFAULT_INDEX: &str = "cirrus";

#[derive(Clone)]
pub struct IndexReplicator {
    backend: Arc<dyn IndexBackend>,
    index: String,
}

impl IndexReplicator {
    pub fn new(backend: Arc<dyn IndexBackend>, index: impl Into<String>) -> Self {
        IndexReplicator {
            backend,
            index: index.into(),
        }
    }

    /// A replicator sharing this one's backend but writing to `index`.
    pub fn for_index(&self, index: impl Into<String>) -> Self {
        IndexReplicator {
            backend: Arc::clone(&self.backend),
            index: index.into(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    pub fn backend(&self) -> &Arc<dyn IndexBackend> {
        &self.backend
    }

    /// Current body of a record's live document.
    pub async fn get(&self, key: &RecordKey) -> Result<Option<Value>, IndexError> {
        self.backend.get(&self.index, &DocId::for_key(key)).await
    }

    /// Create or replace the live document for `record`.
    ///
    /// A granule tombstone with the same identity is removed before the live
    /// document is written.
    pub async fn upsert(&self, record: &Record) -> Result<WriteOutcome, IndexError> {
        let key = record.key();
        if let Some(tombstone) = DocId::tombstone_for(&key) {
            self.backend.delete(&self.index, &tombstone).await?;
        }

        let mut body = record.body()?;
        if let Value::Object(fields) = &mut body {
            fields.insert(TIMESTAMP_FIELD.to_string(), Value::from(now_millis()));
        }
        let outcome = self
            .backend
            .index(&self.index, &DocId::for_key(&key), body)
            .await?;
        tracing::debug!(index = %self.index, key = %key, ?outcome, "replicated record");
        Ok(outcome)
    }

    /// Remove the live document for `key`.
    ///
    /// Deleting a granule leaves a tombstone holding the last live body plus
    /// `deletedAt`. Deleting an absent document is not an error.
    pub async fn delete(&self, key: &RecordKey) -> Result<DeleteOutcome, IndexError> {
        let live = DocId::for_key(key);
        let Some(mut body) = self.backend.get(&self.index, &live).await? else {
            return Ok(DeleteOutcome::AlreadyAbsent);
        };

        if !self.backend.delete(&self.index, &live).await? {
            return Ok(DeleteOutcome::AlreadyAbsent);
        }

        if let Some(tombstone) = DocId::tombstone_for(key) {
            let now = now_millis();
            if let Value::Object(fields) = &mut body {
                fields.insert(DELETED_AT_FIELD.to_string(), Value::from(now));
                fields.insert(TIMESTAMP_FIELD.to_string(), Value::from(now));
            }
            self.backend.index(&self.index, &tombstone, body).await?;
        }
        tracing::debug!(index = %self.index, key = %key, "removed indexed record");
        Ok(DeleteOutcome::Deleted)
    }

    /// Merge `partial` into the live document for `key`.
    ///
    /// With `upsert_if_missing`, a missing document is created from `partial`
    /// alone; otherwise a missing document is `IndexError::NotFound`.
    pub async fn partial_update(
        &self,
        key: &RecordKey,
        partial: Map<String, Value>,
        upsert_if_missing: bool,
    ) -> Result<(), IndexError> {
        if partial.is_empty() {
            return Err(IndexError::NothingToUpdate);
        }
        let mut partial = partial;
        partial.insert(TIMESTAMP_FIELD.to_string(), Value::from(now_millis()));
        let upsert = upsert_if_missing.then(|| Value::Object(partial.clone()));
        self.backend
            .update(&self.index, &DocId::for_key(key), partial, upsert)
            .await
    }
}
