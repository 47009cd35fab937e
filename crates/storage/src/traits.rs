use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::{Record, RecordKey, RecordType};

/// Opaque continuation token issued by a store's `scan_page`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(pub String);

/// One page of a scan.
///
/// `next == None` is the end-of-scan sentinel. A page may be empty while
/// `next` is still set: the store evaluated items but none matched the filter.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    pub next: Option<Cursor>,
}

/// Post-read filter applied by the store to each evaluated item.
///
/// Like a filter expression on a key-value table, it narrows what a page
/// returns but not how many items the page evaluates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Inclusive lower bound on `updatedAt` (epoch ms).
    pub updated_from: Option<i64>,
    /// Inclusive upper bound on `updatedAt` (epoch ms).
    pub updated_to: Option<i64>,
    pub collection_id: Option<String>,
    pub provider: Option<String>,
    /// Matches [`RecordKey::natural_id`].
    pub natural_id: Option<String>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        *self == RecordFilter::default()
    }

    pub fn matches(&self, record: &Record) -> bool {
        let updated_at = record.updated_at();
        if self.updated_from.is_some_and(|from| updated_at < from) {
            return false;
        }
        if self.updated_to.is_some_and(|to| updated_at > to) {
            return false;
        }
        if let Some(collection_id) = &self.collection_id {
            if record.collection_id() != Some(collection_id.as_str()) {
                return false;
            }
        }
        if let Some(provider) = &self.provider {
            if record.provider() != Some(provider.as_str()) {
                return false;
            }
        }
        if let Some(id) = &self.natural_id {
            if record.key().natural_id() != id {
                return false;
            }
        }
        true
    }
}

/// Parameters for a single `scan_page` call.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub record_type: RecordType,
    pub filter: RecordFilter,
    /// Maximum number of items evaluated (not returned) by this page.
    pub limit: usize,
    /// Resume after this cursor; `None` starts from the beginning.
    pub cursor: Option<Cursor>,
}

impl ScanRequest {
    pub fn new(record_type: RecordType, limit: usize) -> Self {
        ScanRequest {
            record_type,
            filter: RecordFilter::default(),
            limit,
            cursor: None,
        }
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn starting_after(mut self, cursor: Option<Cursor>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// The authoritative store for execution, granule and PDR records.
///
/// ## Keys
///
/// Every read and write is addressed by [`RecordKey`]. Writes are upserts:
/// `put` replaces any existing record with the same key.
///
/// ## Transactions
///
/// `transact_write` applies all records or none. A rejected transaction
/// returns `StorageError::TransactionCanceled` and leaves the store unchanged.
///
/// ## Scans
///
/// `scan_page` is cursor-paginated per record type. Callers stop on
/// `Page::next == None`, never on page size: empty pages are legal.
/// [`crate::scan_pages`] wraps this into a lazy stream.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static`; one instance is shared by
/// every component through an `Arc`.
#[async_trait]
pub trait PrimaryStore: Send + Sync + 'static {
    /// Read one record.
    ///
    /// Returns `Err(StorageError::NotFound)` if no record has this key.
    async fn get(&self, key: &RecordKey) -> Result<Record, StorageError>;

    /// Create or replace one record.
    async fn put(&self, record: Record) -> Result<(), StorageError>;

    /// Remove one record.
    ///
    /// Returns `Err(StorageError::NotFound)` if no record has this key.
    async fn delete(&self, key: &RecordKey) -> Result<(), StorageError>;

    /// Create or replace every record in `records` atomically.
    async fn transact_write(&self, records: Vec<Record>) -> Result<(), StorageError>;

    /// Read one page of records of `request.record_type`.
    async fn scan_page(&self, request: ScanRequest) -> Result<Page, StorageError>;
}
