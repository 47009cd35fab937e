pub mod clock;
pub mod conformance;
mod error;
mod memory;
mod record;
mod scan;
mod traits;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use record::{
    ExecutionRecord, GranuleFile, GranuleRecord, PdrRecord, PdrStats, Record, RecordKey,
    RecordType,
};
pub use scan::{collect_records, scan_pages, scan_pages_with};
pub use traits::{Cursor, Page, PrimaryStore, RecordFilter, ScanRequest};
