//! Dual-Write Coordinator: primary store first, then the index.

use std::sync::Arc;

use cirrus_index::{IndexError, IndexReplicator};
use cirrus_interchange::ErrorInfo;
use cirrus_storage::clock::now_millis;
use cirrus_storage::{PrimaryStore, Record, RecordKey, StorageError};
use serde::Serialize;
use serde_json::{json, Map};

use crate::config::WriteConfig;
use crate::error::PipelineError;
use crate::retry::RetryPolicy;

/// How one invocation's records reach the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    /// Fewer records than this are written as one transaction.
    pub transaction_threshold: usize,
    /// Skip the transaction and write every record independently.
    pub best_effort: bool,
}

impl Default for WritePolicy {
    fn default() -> Self {
        WritePolicy::from(&WriteConfig::default())
    }
}

impl From<&WriteConfig> for WritePolicy {
    fn from(config: &WriteConfig) -> Self {
        WritePolicy {
            transaction_threshold: config.transaction_threshold,
            best_effort: config.best_effort,
        }
    }
}

impl WritePolicy {
    pub fn is_transactional(&self, records: usize) -> bool {
        !self.best_effort && records < self.transaction_threshold
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteSummary {
    pub written: usize,
    pub failed: usize,
    pub replicated: usize,
    pub replication_failed: usize,
}

pub struct DualWriteCoordinator {
    store: Arc<dyn PrimaryStore>,
    replicator: IndexReplicator,
    policy: WritePolicy,
    retry: RetryPolicy,
}

impl DualWriteCoordinator {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        replicator: IndexReplicator,
        policy: WritePolicy,
    ) -> Self {
        DualWriteCoordinator {
            store,
            replicator,
            policy,
            retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for every store and index call.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn PrimaryStore> {
        &self.store
    }

    pub fn replicator(&self) -> &IndexReplicator {
        &self.replicator
    }

    /// Write `records` to the primary store, then replicate each one that
    /// landed, in order.
    ///
    /// Every call is retried while it fails transiently. On the transactional
    /// path a failed transaction is returned as an error and nothing is
    /// replicated. Otherwise failures are logged and counted.
    pub async fn write(&self, records: Vec<Record>) -> Result<WriteSummary, PipelineError> {
        let mut summary = WriteSummary::default();
        if records.is_empty() {
            return Ok(summary);
        }

        let written = if self.policy.is_transactional(records.len()) {
            self.retry
                .run("transact_write", StorageError::is_transient, || {
                    self.store.transact_write(records.clone())
                })
                .await?;
            records
        } else {
            let mut written = Vec::with_capacity(records.len());
            for record in records {
                let put = self
                    .retry
                    .run("put", StorageError::is_transient, || self.store.put(record.clone()))
                    .await;
                match put {
                    Ok(()) => written.push(record),
                    Err(e) => {
                        tracing::warn!(key = %record.key(), error = %e, "primary write failed");
                        summary.failed += 1;
                    }
                }
            }
            written
        };
        summary.written = written.len();

        for record in &written {
            let upsert = self
                .retry
                .run("index upsert", IndexError::is_transient, || {
                    self.replicator.upsert(record)
                })
                .await;
            match upsert {
                Ok(_) => summary.replicated += 1,
                Err(e) => {
                    tracing::warn!(key = %record.key(), error = %e, "index replication failed");
                    summary.replication_failed += 1;
                }
            }
        }

        tracing::debug!(
            written = summary.written,
            failed = summary.failed,
            replicated = summary.replicated,
            "dual write finished"
        );
        Ok(summary)
    }

    /// Mark a stored record failed with `error`, then mirror the change.
    ///
    /// A missing primary row is `RecordDoesNotExist`. A missing index document
    /// is rewritten from the primary record; other index failures are logged.
    pub async fn mark_failed(
        &self,
        key: &RecordKey,
        error: ErrorInfo,
    ) -> Result<Record, PipelineError> {
        let lookup = self
            .retry
            .run("get", StorageError::is_transient, || self.store.get(key))
            .await;
        let mut record = match lookup {
            Ok(record) => record,
            Err(StorageError::NotFound { .. }) => {
                return Err(PipelineError::RecordDoesNotExist { key: key.clone() })
            }
            Err(e) => return Err(e.into()),
        };
        let now = now_millis();
        record.fail(error.clone(), now);
        self.retry
            .run("put", StorageError::is_transient, || self.store.put(record.clone()))
            .await?;

        let mut partial = Map::new();
        partial.insert("status".into(), json!(record.status()));
        partial.insert("error".into(), json!(error));
        partial.insert("updatedAt".into(), json!(now));
        let updated = self
            .retry
            .run("index update", IndexError::is_transient, || {
                self.replicator.partial_update(key, partial.clone(), false)
            })
            .await;
        let mirrored = match updated {
            Err(IndexError::NotFound { .. }) => self
                .retry
                .run("index upsert", IndexError::is_transient, || {
                    self.replicator.upsert(&record)
                })
                .await
                .map(|_| ()),
            other => other,
        };
        if let Err(e) = mirrored {
            tracing::warn!(key = %key, error = %e, "index update after mark_failed failed");
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_index::{MemoryIndex, DEFAULT_INDEX};
    use cirrus_interchange::Status;
    use cirrus_storage::conformance::{make_execution, make_granule};
    use cirrus_storage::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        index: Arc<MemoryIndex>,
        writer: DualWriteCoordinator,
    }

    fn fixture(policy: WritePolicy) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryIndex::new());
        let writer = DualWriteCoordinator::new(
            store.clone(),
            IndexReplicator::new(index.clone(), DEFAULT_INDEX),
            policy,
        )
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
        });
        Fixture {
            store,
            index,
            writer,
        }
    }

    fn granules(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| make_granule(&format!("g-{i}"), "C___1").into())
            .collect()
    }

    #[tokio::test]
    async fn small_batches_are_transactional_and_fatal() {
        let f = fixture(WritePolicy::default());
        let records = granules(3);
        f.store.fail_writes_for(records[1].key());

        let err = f.writer.write(records).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Storage(StorageError::TransactionCanceled { .. })
        ));
        assert!(f.store.is_empty());
        assert_eq!(f.index.count(DEFAULT_INDEX), 0);
    }

    #[tokio::test]
    async fn large_batches_isolate_failures() {
        let f = fixture(WritePolicy::default());
        let records = granules(12);
        f.store.fail_writes_for(records[4].key());

        let summary = f.writer.write(records).await.unwrap();
        assert_eq!(summary.written, 11);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.replicated, 11);
        assert_eq!(f.index.count(DEFAULT_INDEX), 11);
    }

    #[tokio::test]
    async fn best_effort_skips_the_transaction() {
        let f = fixture(WritePolicy {
            transaction_threshold: 10,
            best_effort: true,
        });
        let records = granules(2);
        f.store.fail_writes_for(records[0].key());

        let summary = f.writer.write(records).await.unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn replication_failure_does_not_roll_back() {
        let f = fixture(WritePolicy::default());
        let records = granules(2);
        f.index
            .reject_writes_for(cirrus_index::DocId::for_key(&records[0].key()));

        let summary = f.writer.write(records.clone()).await.unwrap();
        assert_eq!(summary.written, 2);
        assert_eq!(summary.replicated, 1);
        assert_eq!(summary.replication_failed, 1);
        f.store.get(&records[0].key()).await.unwrap();
    }

    #[tokio::test]
    async fn throttled_transaction_is_retried() {
        let f = fixture(WritePolicy::default());
        f.store.throttle_next(2);

        let summary = f.writer.write(granules(3)).await.unwrap();
        assert_eq!(summary.written, 3);
        assert_eq!(f.store.len(), 3);
    }

    #[tokio::test]
    async fn unavailable_index_is_retried_until_replicated() {
        let f = fixture(WritePolicy::default());
        f.index.unavailable_next(2);

        let summary = f.writer.write(granules(2)).await.unwrap();
        assert_eq!(summary.replicated, 2);
        assert_eq!(summary.replication_failed, 0);
        assert_eq!(f.index.count(DEFAULT_INDEX), 2);
    }

    #[tokio::test]
    async fn throttling_past_the_budget_is_transient_backend() {
        let f = fixture(WritePolicy::default());
        f.store.throttle_next(3);

        let err = f.writer.write(granules(2)).await.unwrap_err();
        assert!(matches!(err, PipelineError::TransientBackend(_)));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn independent_puts_are_retried() {
        let f = fixture(WritePolicy {
            transaction_threshold: 10,
            best_effort: true,
        });
        f.store.throttle_next(2);

        let summary = f.writer.write(granules(4)).await.unwrap();
        assert_eq!(summary.written, 4);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn mark_failed_updates_both_stores() {
        let f = fixture(WritePolicy::default());
        let record: Record = make_execution("arn:1").into();
        f.writer.write(vec![record.clone()]).await.unwrap();

        let updated = f
            .writer
            .mark_failed(&record.key(), ErrorInfo::new("Not Found", "gone"))
            .await
            .unwrap();
        assert_eq!(updated.status(), Status::Failed);
        assert_eq!(
            f.store.get(&record.key()).await.unwrap().status(),
            Status::Failed
        );
        let doc = f.writer.replicator().get(&record.key()).await.unwrap().unwrap();
        assert_eq!(doc["status"], json!("failed"));
        assert_eq!(doc["error"]["Error"], json!("Not Found"));
        assert_eq!(doc["arn"], json!("arn:1"));
    }

    #[tokio::test]
    async fn mark_failed_rebuilds_missing_index_document() {
        let f = fixture(WritePolicy::default());
        let record: Record = make_granule("g-1", "C___1").into();
        f.store.put(record.clone()).await.unwrap();

        f.writer
            .mark_failed(&record.key(), ErrorInfo::new("Stopped By Operator", "stale"))
            .await
            .unwrap();
        let doc = f.writer.replicator().get(&record.key()).await.unwrap().unwrap();
        assert_eq!(doc["granuleId"], json!("g-1"));
        assert_eq!(doc["status"], json!("failed"));
    }

    #[tokio::test]
    async fn mark_failed_of_missing_record() {
        let f = fixture(WritePolicy::default());
        let err = f
            .writer
            .mark_failed(&RecordKey::pdr("none.PDR"), ErrorInfo::new("x", "y"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RecordDoesNotExist { .. }));
    }

    #[tokio::test]
    async fn mark_failed_retries_both_stores() {
        let f = fixture(WritePolicy::default());
        let record: Record = make_execution("arn:2").into();
        f.writer.write(vec![record.clone()]).await.unwrap();

        f.store.throttle_next(1);
        f.index.unavailable_next(1);
        f.writer
            .mark_failed(&record.key(), ErrorInfo::new("Not Found", "gone"))
            .await
            .unwrap();
        assert_eq!(
            f.store.get(&record.key()).await.unwrap().status(),
            Status::Failed
        );
        let doc = f.writer.replicator().get(&record.key()).await.unwrap().unwrap();
        assert_eq!(doc["status"], json!("failed"));
    }
}
