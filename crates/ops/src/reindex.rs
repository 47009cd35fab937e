//! Bulk reindex: rebuild index documents from the primary store.

use std::collections::BTreeMap;

use cirrus_core::config::ReindexConfig;
use cirrus_core::{PipelineError, RetryPolicy};
use cirrus_index::{IndexError, IndexReplicator};
use cirrus_storage::{scan_pages_with, PrimaryStore, RecordType, ScanRequest, StorageError};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexRequest {
    /// Write to this index instead of the replicator's own.
    pub index_name: Option<String>,
    pub record_types: Vec<RecordType>,
    /// Upserts in flight at once.
    pub concurrency: usize,
    /// Items evaluated per store page.
    pub page_size: usize,
    /// Applied to every page read and every upsert.
    pub retry: RetryPolicy,
}

impl Default for ReindexRequest {
    fn default() -> Self {
        ReindexRequest::from(&ReindexConfig::default())
    }
}

impl From<&ReindexConfig> for ReindexRequest {
    fn from(config: &ReindexConfig) -> Self {
        ReindexRequest {
            index_name: None,
            record_types: RecordType::ALL.to_vec(),
            concurrency: config.concurrency,
            page_size: config.page_size,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub indexed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexSummary {
    pub index: String,
    pub counts: BTreeMap<RecordType, TypeCounts>,
}

impl ReindexSummary {
    pub fn indexed(&self) -> usize {
        self.counts.values().map(|c| c.indexed).sum()
    }

    pub fn failed(&self) -> usize {
        self.counts.values().map(|c| c.failed).sum()
    }
}

/// Upsert every stored record of the requested types into the index.
///
/// Pages are read one at a time; each page's upserts run with at most
/// `request.concurrency` in flight. Transient failures are retried under
/// `request.retry`. A page read that still fails aborts the run, an upsert
/// that still fails is logged and counted.
pub async fn index_from_database<S>(
    store: &S,
    replicator: &IndexReplicator,
    request: &ReindexRequest,
) -> Result<ReindexSummary, PipelineError>
where
    S: PrimaryStore + ?Sized,
{
    let target = match &request.index_name {
        Some(name) => replicator.for_index(name),
        None => replicator.clone(),
    };
    let mut summary = ReindexSummary {
        index: target.index_name().to_string(),
        counts: BTreeMap::new(),
    };

    for &record_type in &request.record_types {
        tracing::info!(%record_type, index = target.index_name(), "reindexing");
        let mut counts = TypeCounts::default();
        let retry = &request.retry;
        let mut pages = Box::pin(scan_pages_with(
            ScanRequest::new(record_type, request.page_size.max(1)),
            move |page: ScanRequest| {
                retry.run("scan_page", StorageError::is_transient, move || {
                    store.scan_page(page.clone())
                })
            },
        ));

        while let Some(page) = pages.try_next().await? {
            let target = &target;
            let results: Vec<_> = stream::iter(page.records)
                .map(|record| async move {
                    let result = retry
                        .run("index upsert", IndexError::is_transient, || {
                            target.upsert(&record)
                        })
                        .await;
                    (record, result)
                })
                .buffer_unordered(request.concurrency.max(1))
                .collect()
                .await;

            for (record, result) in results {
                match result {
                    Ok(_) => {
                        tracing::debug!(key = %record.key(), "indexed");
                        counts.indexed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(key = %record.key(), error = %e, "failed to index record");
                        counts.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            %record_type,
            indexed = counts.indexed,
            failed = counts.failed,
            "reindexed record type"
        );
        summary.counts.insert(record_type, counts);
    }
    Ok(summary)
}
