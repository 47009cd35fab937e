//! Contract checks for `PrimaryStore` backends.
//!
//! Every backend must give the same answers to the pipeline: keyed reads and
//! writes, collection-scoped granule identity, all-or-nothing transactions,
//! cursor scans that visit each record once, and safe sharing across tasks.
//! [`check_primary_store`] runs each check against a fresh store from the
//! caller's factory and returns a [`ContractReport`].
//!
//! ```ignore
//! use cirrus_storage::conformance::check_primary_store;
//!
//! #[tokio::test]
//! async fn table_honours_contract() {
//!     let report = check_primary_store(|| async { create_test_table().await }).await;
//!     assert!(report.is_conforming(), "{report}");
//! }
//! ```
//!
//! The record builders below are shared with the other crates' tests.

mod concurrent;
mod crud;
mod keys;
mod scan;
mod transaction;

use std::fmt;
use std::future::Future;

use cirrus_interchange::Status;

use crate::record::{ExecutionRecord, GranuleRecord, PdrRecord, PdrStats};
use crate::PrimaryStore;

/// Part of the `PrimaryStore` contract a check exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractArea {
    Crud,
    Keys,
    Transactions,
    Scans,
    Concurrency,
}

impl ContractArea {
    pub const ALL: [ContractArea; 5] = [
        ContractArea::Crud,
        ContractArea::Keys,
        ContractArea::Transactions,
        ContractArea::Scans,
        ContractArea::Concurrency,
    ];
}

impl fmt::Display for ContractArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContractArea::Crud => "crud",
            ContractArea::Keys => "keys",
            ContractArea::Transactions => "transactions",
            ContractArea::Scans => "scans",
            ContractArea::Concurrency => "concurrency",
        })
    }
}

/// One contract check run against a fresh store.
#[derive(Debug, Clone)]
pub struct Check {
    pub area: ContractArea,
    pub name: &'static str,
    /// What the store got wrong; `None` when it held up its end.
    pub violation: Option<String>,
}

impl Check {
    fn new(area: ContractArea, name: &'static str, outcome: Result<(), String>) -> Self {
        Self {
            area,
            name,
            violation: outcome.err(),
        }
    }
}

/// Every check run against one backend.
#[derive(Debug, Clone, Default)]
pub struct ContractReport {
    pub checks: Vec<Check>,
}

impl ContractReport {
    pub fn violations(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.violation.is_some())
    }

    pub fn is_conforming(&self) -> bool {
        self.violations().next().is_none()
    }

    /// Number of checks run for `area`.
    pub fn checks_in(&self, area: ContractArea) -> usize {
        self.checks.iter().filter(|c| c.area == area).count()
    }
}

impl fmt::Display for ContractReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let violated = self.violations().count();
        writeln!(
            f,
            "PrimaryStore contract: {violated} of {} checks violated",
            self.checks.len()
        )?;
        for check in self.violations() {
            let detail = check.violation.as_deref().unwrap_or_default();
            writeln!(f, "  {}::{}: {detail}", check.area, check.name)?;
        }
        Ok(())
    }
}

/// Run every contract check, building a fresh store per check via `factory`.
pub async fn check_primary_store<S, F, Fut>(factory: F) -> ContractReport
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut checks = crud::crud_checks(&factory).await;
    checks.extend(keys::key_checks(&factory).await);
    checks.extend(transaction::transaction_checks(&factory).await);
    checks.extend(scan::scan_checks(&factory).await);
    checks.extend(concurrent::concurrency_checks(&factory).await);
    ContractReport { checks }
}

const BASE_TIME: i64 = 1_700_000_000_000;

pub fn make_execution(arn: &str) -> ExecutionRecord {
    ExecutionRecord {
        arn: arn.to_string(),
        name: arn.rsplit(':').next().unwrap_or(arn).to_string(),
        status: Status::Completed,
        workflow_type: Some("IngestGranule".to_string()),
        collection_id: Some("MOD09GQ___006".to_string()),
        error: None,
        parent_arn: None,
        created_at: BASE_TIME,
        updated_at: BASE_TIME + 60_000,
        duration: 60.0,
    }
}

pub fn make_granule(granule_id: &str, collection_id: &str) -> GranuleRecord {
    GranuleRecord {
        granule_id: granule_id.to_string(),
        collection_id: collection_id.to_string(),
        status: Status::Completed,
        published: false,
        cmr_link: None,
        files: vec![],
        product_volume: 0,
        execution: None,
        pdr_name: None,
        provider: Some("s3_provider".to_string()),
        error: None,
        created_at: BASE_TIME,
        updated_at: BASE_TIME + 60_000,
        duration: 60.0,
        time_to_preprocess: 0.0,
        time_to_archive: 0.0,
        processing_start_date_time: None,
        processing_end_date_time: None,
    }
}

pub fn make_pdr(pdr_name: &str) -> PdrRecord {
    let stats = PdrStats::new(0, 1, 0);
    PdrRecord {
        pdr_name: pdr_name.to_string(),
        collection_id: "MOD09GQ___006".to_string(),
        provider: "s3_provider".to_string(),
        status: Status::Completed,
        progress: stats.progress(),
        stats,
        execution: None,
        pan_sent: false,
        pan_message: None,
        error: None,
        created_at: BASE_TIME,
        updated_at: BASE_TIME + 60_000,
        duration: 60.0,
    }
}
