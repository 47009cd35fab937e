//! Ingest entry points: one workflow event in, records in both stores out.

use std::sync::Arc;

use cirrus_index::IndexReplicator;
use cirrus_interchange::{normalize, split_batch, CanonicalMessage};
use cirrus_storage::clock::now_millis;
use cirrus_storage::{ExecutionRecord, GranuleRecord, PdrRecord, PrimaryStore, Record};
use serde::Serialize;
use serde_json::Value;

use crate::builder::RecordBuilder;
use crate::config::CirrusConfig;
use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::writer::{DualWriteCoordinator, WritePolicy, WriteSummary};

/// Records produced by one workflow event.
///
/// A granule or PDR validation failure does not abort the event: the other
/// records are still written and the failure is reported here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadResult {
    pub execution: ExecutionRecord,
    pub pdr: Option<PdrRecord>,
    pub granules: Vec<GranuleRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granule_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdr_error: Option<String>,
    pub write: WriteSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    /// Position of the message in the batch.
    pub position: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub messages: usize,
    pub succeeded: usize,
    pub failures: Vec<BatchFailure>,
}

pub struct Pipeline {
    builder: RecordBuilder,
    writer: DualWriteCoordinator,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        replicator: IndexReplicator,
        policy: WritePolicy,
    ) -> Result<Self, PipelineError> {
        Self::with_retry(store, replicator, policy, RetryPolicy::default())
    }

    /// Like [`Pipeline::new`], retrying transient store and index failures
    /// under `retry`.
    pub fn with_retry(
        store: Arc<dyn PrimaryStore>,
        replicator: IndexReplicator,
        policy: WritePolicy,
        retry: RetryPolicy,
    ) -> Result<Self, PipelineError> {
        Ok(Pipeline {
            builder: RecordBuilder::new(Arc::clone(&store))?.with_retry(retry),
            writer: DualWriteCoordinator::new(store, replicator, policy).with_retry(retry),
        })
    }

    /// Build a pipeline writing to the configured index.
    pub fn from_config(
        store: Arc<dyn PrimaryStore>,
        replicator: &IndexReplicator,
        config: &CirrusConfig,
    ) -> Result<Self, PipelineError> {
        Self::with_retry(
            store,
            replicator.for_index(&config.index.name),
            WritePolicy::from(&config.write),
            RetryPolicy::from(&config.retry),
        )
    }

    pub fn writer(&self) -> &DualWriteCoordinator {
        &self.writer
    }

    /// Normalize, build and dual-write one workflow event.
    pub async fn handle_payload(&self, event: &Value) -> Result<PayloadResult, PipelineError> {
        let message = normalize(event)?;
        self.handle_message(&message).await
    }

    pub async fn handle_message(
        &self,
        message: &CanonicalMessage,
    ) -> Result<PayloadResult, PipelineError> {
        let now = now_millis();
        let execution = self.builder.build_execution(message, now).await?;

        let (pdr, pdr_error) = match self.builder.build_pdr(message, now) {
            Ok(pdr) => (pdr, None),
            Err(e) => {
                tracing::warn!(arn = %message.execution_arn, error = %e, "skipping PDR record");
                (None, Some(e.to_string()))
            }
        };
        let (granules, granule_error) = match self.builder.build_granules(message, now) {
            Ok(granules) => (granules, None),
            Err(e) => {
                tracing::warn!(arn = %message.execution_arn, error = %e, "skipping granule records");
                (Vec::new(), Some(e.to_string()))
            }
        };

        let mut records: Vec<Record> = Vec::with_capacity(2 + granules.len());
        records.push(execution.clone().into());
        records.extend(pdr.clone().map(Record::from));
        records.extend(granules.iter().cloned().map(Record::from));

        let write = self.writer.write(records).await?;
        tracing::info!(
            arn = %execution.arn,
            status = %execution.status,
            granules = granules.len(),
            pdr = pdr.is_some(),
            "processed workflow message"
        );
        Ok(PayloadResult {
            execution,
            pdr,
            granules,
            granule_error,
            pdr_error,
            write,
        })
    }

    /// Handle every message of a transport batch independently.
    pub async fn handle_batch(&self, event: &Value) -> BatchSummary {
        let messages = split_batch(event);
        let mut summary = BatchSummary {
            messages: messages.len(),
            ..BatchSummary::default()
        };
        for (position, message) in messages.iter().enumerate() {
            match self.handle_payload(message).await {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    tracing::warn!(position, error = %e, "message in batch failed");
                    summary.failures.push(BatchFailure {
                        position,
                        error: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            messages = summary.messages,
            succeeded = summary.succeeded,
            failed = summary.failures.len(),
            "processed batch"
        );
        summary
    }
}
