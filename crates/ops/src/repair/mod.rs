//! Stale-execution repair.
//!
//! Executions whose completion message never arrived stay `running` in both
//! stores. [`StaleExecutionSweep`] finds them through the index, asks the
//! orchestrator what actually happened, and re-drives the ingest pipeline so
//! the records reach a terminal state:
//!
//! | orchestrator says          | action                                        |
//! |----------------------------|-----------------------------------------------|
//! | not found                  | fail with `Not Found`, propagate              |
//! | running, past the deadline | stop, fail with `Stopped By Operator`, propagate |
//! | running, within deadline   | skip                                          |
//! | succeeded / failed         | re-drive with the recorded output or input    |
//!
//! Propagation marks every granule and PDR whose `execution` field is the
//! execution's ARN as failed with the same error.

mod orchestrator;

pub use orchestrator::{
    ExecutionDescription, ExecutionStatus, MemoryOrchestrator, Orchestrator, OrchestratorError,
};

use std::sync::Arc;
use std::time::Duration;

use cirrus_core::config::RepairConfig;
use cirrus_core::{Pipeline, PipelineError, RetryPolicy};
use cirrus_index::{scroll_all, DocType, IndexError, SearchQuery, SortOrder};
use cirrus_interchange::{ErrorInfo, Status};
use cirrus_storage::clock::now_millis;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const NOT_FOUND_ERROR: &str = "Not Found";
pub const STOPPED_ERROR: &str = "Stopped By Operator";

#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairSettings {
    /// Candidates examined per run.
    pub page_size: usize,
    /// Orchestrator lookups in flight at once.
    pub concurrency: usize,
    pub stale_after: Duration,
}

impl Default for RepairSettings {
    fn default() -> Self {
        RepairSettings::from(&RepairConfig::default())
    }
}

impl From<&RepairConfig> for RepairSettings {
    fn from(config: &RepairConfig) -> Self {
        RepairSettings {
            page_size: config.page_size,
            concurrency: config.concurrency,
            stale_after: Duration::from_secs(config.stale_after_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub examined: usize,
    pub skipped: usize,
    pub redriven: usize,
    pub not_found: usize,
    pub stopped: usize,
    /// Granule and PDR records marked failed after their execution was.
    pub propagated: usize,
    pub errors: usize,
}

#[derive(Debug)]
struct Candidate {
    arn: String,
    created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Skipped,
    Redriven,
    NotFound { propagated: usize },
    Stopped { propagated: usize },
}

pub struct StaleExecutionSweep {
    pipeline: Arc<Pipeline>,
    orchestrator: Arc<dyn Orchestrator>,
    settings: RepairSettings,
    retry: RetryPolicy,
}

impl StaleExecutionSweep {
    pub fn new(
        pipeline: Arc<Pipeline>,
        orchestrator: Arc<dyn Orchestrator>,
        settings: RepairSettings,
        retry: RetryPolicy,
    ) -> Self {
        StaleExecutionSweep {
            pipeline,
            orchestrator,
            settings,
            retry,
        }
    }

    /// Examine one page of running executions, oldest first.
    ///
    /// Fails only if the candidate search fails; per-execution failures are
    /// logged and counted in `errors`.
    pub async fn run(&self) -> Result<SweepSummary, RepairError> {
        let now = now_millis();
        let candidates = self.discover().await?;
        tracing::info!(candidates = candidates.len(), "starting stale execution sweep");

        let mut summary = SweepSummary {
            examined: candidates.len(),
            ..SweepSummary::default()
        };
        let outcomes: Vec<_> = stream::iter(candidates)
            .map(|candidate| async move {
                let result = self.repair(&candidate, now).await;
                (candidate, result)
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for (candidate, outcome) in outcomes {
            match outcome {
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Ok(Outcome::Redriven) => summary.redriven += 1,
                Ok(Outcome::NotFound { propagated }) => {
                    summary.not_found += 1;
                    summary.propagated += propagated;
                }
                Ok(Outcome::Stopped { propagated }) => {
                    summary.stopped += 1;
                    summary.propagated += propagated;
                }
                Err(e) => {
                    tracing::warn!(arn = %candidate.arn, error = %e, "repair failed");
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            examined = summary.examined,
            skipped = summary.skipped,
            redriven = summary.redriven,
            not_found = summary.not_found,
            stopped = summary.stopped,
            propagated = summary.propagated,
            errors = summary.errors,
            "stale execution sweep finished"
        );
        Ok(summary)
    }

    async fn discover(&self) -> Result<Vec<Candidate>, IndexError> {
        let replicator = self.pipeline.writer().replicator();
        let query = SearchQuery::new(DocType::Execution)
            .term("status", Status::Running.as_str())
            .sort_by("createdAt", SortOrder::Asc)
            .size(self.settings.page_size);
        let response = self
            .retry
            .run("search running executions", IndexError::is_transient, || {
                replicator.backend().search(replicator.index_name(), &query)
            })
            .await?;
        Ok(response
            .hits
            .into_iter()
            .map(|hit| Candidate {
                arn: hit
                    .body
                    .get("arn")
                    .and_then(Value::as_str)
                    .map_or(hit.id.id.clone(), str::to_string),
                created_at: hit.body.get("createdAt").and_then(Value::as_i64).unwrap_or(0),
            })
            .collect())
    }

    async fn repair(&self, candidate: &Candidate, now: i64) -> Result<Outcome, RepairError> {
        let arn = candidate.arn.as_str();
        let description = self
            .retry
            .run("describe_execution", OrchestratorError::is_transient, || {
                self.orchestrator.describe_execution(arn)
            })
            .await?;

        match description.status {
            ExecutionStatus::NotFound => {
                let missing = PipelineError::NotFoundUpstream {
                    arn: arn.to_string(),
                };
                tracing::info!(arn, "{}", missing);
                let error = ErrorInfo::new(NOT_FOUND_ERROR, missing.to_string());
                let propagated = self.fail_execution(arn, error).await?;
                Ok(Outcome::NotFound { propagated })
            }
            ExecutionStatus::Running
                if is_stale(candidate.created_at, now, self.settings.stale_after) =>
            {
                let cause = format!(
                    "Execution {} has been running longer than {} seconds",
                    arn,
                    self.settings.stale_after.as_secs()
                );
                self.retry
                    .run("stop_execution", OrchestratorError::is_transient, || {
                        self.orchestrator.stop_execution(arn, &cause, STOPPED_ERROR)
                    })
                    .await?;
                let propagated = self
                    .fail_execution(arn, ErrorInfo::new(STOPPED_ERROR, cause.as_str()))
                    .await?;
                Ok(Outcome::Stopped { propagated })
            }
            ExecutionStatus::Running => {
                tracing::debug!(arn, "execution still within its deadline");
                Ok(Outcome::Skipped)
            }
            ExecutionStatus::Succeeded => {
                let message =
                    workflow_message(description.output, arn, Status::Completed, None);
                self.pipeline.handle_payload(&message).await?;
                Ok(Outcome::Redriven)
            }
            ExecutionStatus::Failed => {
                let error = ErrorInfo::new(
                    description.error.unwrap_or_else(|| "Unknown Error".to_string()),
                    description.cause.unwrap_or_default(),
                );
                let message =
                    workflow_message(description.input, arn, Status::Failed, Some(&error));
                self.pipeline.handle_payload(&message).await?;
                Ok(Outcome::Redriven)
            }
        }
    }

    /// Record the execution as failed, then fail its granules and PDRs.
    async fn fail_execution(&self, arn: &str, error: ErrorInfo) -> Result<usize, RepairError> {
        let message = workflow_message(None, arn, Status::Failed, Some(&error));
        self.pipeline.handle_payload(&message).await?;
        self.propagate(arn, &error).await
    }

    async fn propagate(&self, arn: &str, error: &ErrorInfo) -> Result<usize, RepairError> {
        let writer = self.pipeline.writer();
        let replicator = writer.replicator();
        let mut propagated = 0;
        for doc_type in [DocType::Granule, DocType::Pdr] {
            let query = SearchQuery::new(doc_type).term("execution", arn);
            let hits = self
                .retry
                .run("search linked records", IndexError::is_transient, || {
                    scroll_all(replicator.backend().as_ref(), replicator.index_name(), query.clone())
                })
                .await?;
            for hit in hits {
                let Some(key) = hit.id.record_key() else {
                    tracing::warn!(doc = %hit.id, "cannot map document to a record");
                    continue;
                };
                match writer.mark_failed(&key, error.clone()).await {
                    Ok(_) => propagated += 1,
                    Err(PipelineError::RecordDoesNotExist { key }) => {
                        tracing::warn!(%key, arn, "indexed record missing from primary store");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(propagated)
    }
}

fn is_stale(created_at: i64, now: i64, stale_after: Duration) -> bool {
    let age = now.saturating_sub(created_at);
    age > i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX)
}

/// Shape `base` into a workflow message for `arn` with `status`.
///
/// `base` is the orchestrator's recorded input or output; when absent the
/// message carries only the execution identity.
fn workflow_message(
    base: Option<Value>,
    arn: &str,
    status: Status,
    error: Option<&ErrorInfo>,
) -> Value {
    let mut message = match base {
        Some(Value::Object(fields)) => fields,
        _ => Map::new(),
    };
    set_field(&mut message, "cumulus_meta", "execution_arn", json!(arn));
    set_field(&mut message, "meta", "status", json!(status.as_str()));
    if let Some(error) = error {
        message.insert("exception".to_string(), json!(error));
    }
    Value::Object(message)
}

fn set_field(message: &mut Map<String, Value>, section: &str, field: &str, value: Value) {
    let entry = message
        .entry(section.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(fields) = entry {
        fields.insert(field.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_message_from_nothing() {
        let error = ErrorInfo::new(NOT_FOUND_ERROR, "gone");
        let message = workflow_message(None, "arn:1", Status::Failed, Some(&error));
        assert_eq!(message["cumulus_meta"]["execution_arn"], json!("arn:1"));
        assert_eq!(message["meta"]["status"], json!("failed"));
        assert_eq!(message["exception"]["Error"], json!("Not Found"));
    }

    #[test]
    fn workflow_message_keeps_recorded_fields() {
        let output = json!({
            "cumulus_meta": {"workflow_start_time": 5},
            "meta": {"status": "running", "workflow_name": "IngestGranule"},
            "payload": {"granules": []}
        });
        let message = workflow_message(Some(output), "arn:1", Status::Completed, None);
        assert_eq!(message["cumulus_meta"]["workflow_start_time"], json!(5));
        assert_eq!(message["meta"]["status"], json!("completed"));
        assert_eq!(message["meta"]["workflow_name"], json!("IngestGranule"));
        assert!(message.get("exception").is_none());
    }

    #[test]
    fn staleness_is_strictly_past_the_deadline() {
        let hour = Duration::from_secs(3600);
        assert!(!is_stale(0, 3_600_000, hour));
        assert!(is_stale(0, 3_600_001, hour));
        assert!(!is_stale(0, i64::MAX, Duration::MAX));
    }

    #[test]
    fn settings_follow_config() {
        let settings = RepairSettings::default();
        assert_eq!(settings.page_size, 100);
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.stale_after, Duration::from_secs(5 * 60 * 60));
    }
}
