//! In-process [`PrimaryStore`] backed by ordered maps.
//!
//! Used by the test suites and by the local operator harness. Scan order is
//! key order; cursors are the JSON encoding of the last evaluated key.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{Record, RecordKey, RecordType};
use crate::traits::{Cursor, Page, PrimaryStore, ScanRequest};

/// Item limit of a single transaction, matching common key-value stores.
pub const DEFAULT_MAX_TRANSACTION_ITEMS: usize = 100;

type Table = BTreeMap<RecordKey, Record>;

#[derive(Default)]
struct Inner {
    tables: BTreeMap<RecordType, Table>,
    failing_keys: HashSet<RecordKey>,
    throttle_remaining: usize,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    max_transaction_items: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Mutex::new(Inner::default()),
            max_transaction_items: DEFAULT_MAX_TRANSACTION_ITEMS,
        }
    }

    /// Seed a store, e.g. from a saved state file.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap_or_else(|e| e.into_inner());
            for record in records {
                inner
                    .tables
                    .entry(record.record_type())
                    .or_default()
                    .insert(record.key(), record);
            }
        }
        store
    }

    /// Reject transactions larger than `items`.
    pub fn with_max_transaction_items(mut self, items: usize) -> Self {
        self.max_transaction_items = items;
        self
    }

    /// Every stored record, grouped by type, in key order.
    pub fn records(&self) -> Vec<Record> {
        match self.lock() {
            Ok(inner) => inner
                .tables
                .values()
                .flat_map(|t| t.values().cloned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock()
            .map(|inner| inner.tables.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every write touching `key` fail with a backend error.
    pub fn fail_writes_for(&self, key: RecordKey) {
        if let Ok(mut inner) = self.lock() {
            inner.failing_keys.insert(key);
        }
    }

    /// Make the next `calls` operations fail with `Throttled`.
    pub fn throttle_next(&self, calls: usize) {
        if let Ok(mut inner) = self.lock() {
            inner.throttle_remaining = calls;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }

    /// Lock and consume one unit of injected throttling, if any.
    fn enter(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        let mut inner = self.lock()?;
        if inner.throttle_remaining > 0 {
            inner.throttle_remaining -= 1;
            return Err(StorageError::Throttled(
                "provisioned throughput exceeded".to_string(),
            ));
        }
        Ok(inner)
    }
}

fn encode_cursor(key: &RecordKey) -> Result<Cursor, StorageError> {
    serde_json::to_string(key)
        .map(Cursor)
        .map_err(|e| StorageError::Backend(e.to_string()))
}

fn decode_cursor(cursor: &Cursor) -> Result<RecordKey, StorageError> {
    serde_json::from_str(&cursor.0).map_err(|_| StorageError::InvalidCursor(cursor.0.clone()))
}

#[async_trait]
impl PrimaryStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Record, StorageError> {
        let inner = self.enter()?;
        inner
            .tables
            .get(&key.record_type())
            .and_then(|t| t.get(key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound { key: key.clone() })
    }

    async fn put(&self, record: Record) -> Result<(), StorageError> {
        let mut inner = self.enter()?;
        let key = record.key();
        if inner.failing_keys.contains(&key) {
            return Err(StorageError::Backend(format!("write rejected for {}", key)));
        }
        inner
            .tables
            .entry(record.record_type())
            .or_default()
            .insert(key, record);
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), StorageError> {
        let mut inner = self.enter()?;
        inner
            .tables
            .get_mut(&key.record_type())
            .and_then(|t| t.remove(key))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound { key: key.clone() })
    }

    async fn transact_write(&self, records: Vec<Record>) -> Result<(), StorageError> {
        let mut inner = self.enter()?;
        let items = records.len();
        if items > self.max_transaction_items {
            return Err(StorageError::TransactionCanceled {
                items,
                reason: format!(
                    "transaction exceeds the {} item limit",
                    self.max_transaction_items
                ),
            });
        }

        let mut seen = HashSet::with_capacity(items);
        for record in &records {
            let key = record.key();
            if inner.failing_keys.contains(&key) {
                return Err(StorageError::TransactionCanceled {
                    items,
                    reason: format!("write rejected for {}", key),
                });
            }
            if !seen.insert(key.clone()) {
                return Err(StorageError::TransactionCanceled {
                    items,
                    reason: format!("duplicate item {}", key),
                });
            }
        }

        for record in records {
            inner
                .tables
                .entry(record.record_type())
                .or_default()
                .insert(record.key(), record);
        }
        Ok(())
    }

    async fn scan_page(&self, request: ScanRequest) -> Result<Page, StorageError> {
        let inner = self.enter()?;
        let Some(table) = inner.tables.get(&request.record_type) else {
            return Ok(Page::default());
        };

        let lower = match &request.cursor {
            Some(cursor) => {
                let key = decode_cursor(cursor)?;
                if key.record_type() != request.record_type {
                    return Err(StorageError::InvalidCursor(cursor.0.clone()));
                }
                Bound::Excluded(key)
            }
            None => Bound::Unbounded,
        };

        let limit = request.limit.max(1);
        let mut evaluated = table.range((lower, Bound::Unbounded));
        let mut records = Vec::new();
        let mut last_key = None;
        for (key, record) in evaluated.by_ref().take(limit) {
            last_key = Some(key);
            if request.filter.matches(record) {
                records.push(record.clone());
            }
        }

        let next = match (last_key, evaluated.next()) {
            (Some(key), Some(_)) => Some(encode_cursor(key)?),
            _ => None,
        };
        Ok(Page { records, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::{make_execution, make_granule};

    #[tokio::test]
    async fn transaction_over_item_limit_is_canceled_atomically() {
        let store = MemoryStore::new().with_max_transaction_items(2);
        let records: Vec<Record> = (0..3)
            .map(|i| make_execution(&format!("arn:{}", i)).into())
            .collect();
        let err = store.transact_write(records).await.unwrap_err();
        assert!(matches!(err, StorageError::TransactionCanceled { items: 3, .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn failing_key_rejects_put_and_transaction() {
        let store = MemoryStore::new();
        let g = make_granule("g-1", "C___1");
        store.fail_writes_for(Record::from(g.clone()).key());
        assert!(store.put(g.clone().into()).await.is_err());
        let other: Record = make_execution("arn:ok").into();
        assert!(store.transact_write(vec![other, g.into()]).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn throttling_is_transient_and_counts_down() {
        let store = MemoryStore::new();
        store.throttle_next(1);
        let err = store.get(&RecordKey::execution("arn:x")).await.unwrap_err();
        assert!(err.is_transient());
        let err = store.get(&RecordKey::execution("arn:x")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn foreign_cursor_is_rejected() {
        let store = MemoryStore::from_records(vec![make_execution("arn:1").into()]);
        let request = ScanRequest::new(RecordType::Execution, 1)
            .starting_after(Some(Cursor("garbage".to_string())));
        assert!(matches!(
            store.scan_page(request).await,
            Err(StorageError::InvalidCursor(_))
        ));
    }

    #[test]
    fn from_records_round_trips() {
        let store = MemoryStore::from_records(vec![
            make_execution("arn:1").into(),
            make_granule("g", "C___1").into(),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.records().len(), 2);
    }
}
