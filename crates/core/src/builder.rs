//! Record Builder: turn a [`CanonicalMessage`] into typed records.
//!
//! Granule and PDR records are built purely from the message. The execution
//! record is merged with the stored one, which is the builder's only read.

use std::sync::Arc;

use cirrus_interchange::{CanonicalMessage, Status};
use cirrus_storage::clock::to_rfc3339;
use cirrus_storage::{
    ExecutionRecord, GranuleFile, GranuleRecord, PdrRecord, PdrStats, PrimaryStore, Record,
    RecordKey, RecordType, StorageError,
};
use serde_json::{json, Map, Value};

use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::schema::RecordSchemas;

pub struct RecordBuilder {
    store: Arc<dyn PrimaryStore>,
    schemas: RecordSchemas,
    retry: RetryPolicy,
}

fn duration_secs(created_at: i64, now: i64) -> f64 {
    (now - created_at).max(0) as f64 / 1000.0
}

impl RecordBuilder {
    pub fn new(store: Arc<dyn PrimaryStore>) -> Result<Self, PipelineError> {
        Ok(RecordBuilder {
            store,
            schemas: RecordSchemas::new()?,
            retry: RetryPolicy::default(),
        })
    }

    /// Retry policy for the stored-execution lookup.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the execution record for `message` as of `now`.
    ///
    /// Terminal messages update the stored record, keeping its `createdAt`
    /// and any fields the message leaves out. A `running` message for an
    /// execution already stored as terminal returns the stored record as-is.
    pub async fn build_execution(
        &self,
        message: &CanonicalMessage,
        now: i64,
    ) -> Result<ExecutionRecord, PipelineError> {
        let key = RecordKey::execution(&message.execution_arn);
        let lookup = self
            .retry
            .run("get execution", StorageError::is_transient, || self.store.get(&key))
            .await;
        let stored = match lookup {
            Ok(Record::Execution(existing)) => Some(existing),
            Ok(other) => {
                return Err(PipelineError::validation(
                    RecordType::Execution,
                    format!("{} resolved to a {} record", key, other.record_type()),
                ))
            }
            Err(StorageError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        let created_at = message.created_at.unwrap_or(now);
        let mut record = ExecutionRecord {
            arn: message.execution_arn.clone(),
            name: message.execution_name.clone(),
            status: message.status,
            workflow_type: message.workflow_name.clone(),
            collection_id: message.collection_id.clone(),
            error: message.error.clone(),
            parent_arn: message.parent_execution_arn.clone(),
            created_at,
            updated_at: now,
            duration: duration_secs(created_at, now),
        };

        match stored {
            Some(existing) if message.status == Status::Running && existing.status.is_terminal() => {
                tracing::debug!(
                    arn = %existing.arn,
                    status = %existing.status,
                    "ignoring running message for terminal execution"
                );
                return Ok(existing);
            }
            Some(existing) if message.status.is_terminal() => {
                record.created_at = existing.created_at;
                record.duration = duration_secs(existing.created_at, now);
                record.workflow_type = record.workflow_type.or(existing.workflow_type);
                record.collection_id = record.collection_id.or(existing.collection_id);
                record.parent_arn = record.parent_arn.or(existing.parent_arn);
            }
            _ => {}
        }
        if record.status == Status::Completed {
            record.error = None;
        }

        let body = serde_json::to_value(&record)
            .map_err(|e| PipelineError::validation(RecordType::Execution, e.to_string()))?;
        self.schemas.validate(RecordType::Execution, &body)?;
        Ok(record)
    }

    /// Build one granule record per payload granule.
    ///
    /// Any invalid granule fails the whole batch.
    pub fn build_granules(
        &self,
        message: &CanonicalMessage,
        now: i64,
    ) -> Result<Vec<GranuleRecord>, PipelineError> {
        message
            .granules
            .iter()
            .enumerate()
            .map(|(position, raw)| {
                self.build_granule(message, raw, now).map_err(|e| match e {
                    PipelineError::Validation { message: m, .. } => PipelineError::validation(
                        RecordType::Granule,
                        format!("granule {}: {}", position, m),
                    ),
                    other => other,
                })
            })
            .collect()
    }

    fn build_granule(
        &self,
        message: &CanonicalMessage,
        raw: &Value,
        now: i64,
    ) -> Result<GranuleRecord, PipelineError> {
        let Some(fields) = raw.as_object() else {
            return Err(PipelineError::validation(
                RecordType::Granule,
                "payload granule is not an object",
            ));
        };

        let files: Vec<GranuleFile> = match fields.get("files") {
            Some(Value::Array(files)) => files
                .iter()
                .map(|f| serde_json::from_value(f.clone()))
                .collect::<Result<_, _>>()
                .map_err(|e| PipelineError::validation(RecordType::Granule, e.to_string()))?,
            _ => Vec::new(),
        };
        let product_volume: u64 = files.iter().filter_map(|f| f.size).sum();

        let created_at = message.created_at.unwrap_or(now);
        let collection_id = message
            .collection_id
            .as_deref()
            .or_else(|| fields.get("collectionId").and_then(Value::as_str));
        let millis = |field: &str| fields.get(field).and_then(Value::as_f64).unwrap_or(0.0);

        let mut body = Map::new();
        if let Some(id) = fields.get("granuleId") {
            body.insert("granuleId".into(), id.clone());
        }
        if let Some(collection_id) = collection_id {
            body.insert("collectionId".into(), json!(collection_id));
        }
        body.insert("status".into(), json!(message.status));
        body.insert(
            "published".into(),
            json!(fields.get("published").and_then(Value::as_bool).unwrap_or(false)),
        );
        if let Some(link) = fields.get("cmrLink").and_then(Value::as_str) {
            body.insert("cmrLink".into(), json!(link));
        }
        body.insert("files".into(), json!(files));
        body.insert("productVolume".into(), json!(product_volume));
        body.insert("execution".into(), json!(message.execution_arn));
        if let Some(name) = message.pdr.as_ref().and_then(|p| p.name.as_ref()) {
            body.insert("pdrName".into(), json!(name));
        }
        if let Some(provider) = &message.provider {
            body.insert("provider".into(), json!(provider));
        }
        if let Some(error) = &message.error {
            body.insert("error".into(), json!(error));
        }
        body.insert("createdAt".into(), json!(created_at));
        body.insert("updatedAt".into(), json!(now));
        body.insert("duration".into(), json!(duration_secs(created_at, now)));
        body.insert(
            "timeToPreprocess".into(),
            json!(millis("sync_granule_duration") / 1000.0),
        );
        body.insert(
            "timeToArchive".into(),
            json!(millis("post_to_cmr_duration") / 1000.0),
        );
        if let Some(start) = message.created_at.and_then(to_rfc3339) {
            body.insert("processingStartDateTime".into(), json!(start));
            let end = to_rfc3339(message.stopped_at.unwrap_or(now)).unwrap_or_default();
            body.insert("processingEndDateTime".into(), json!(end));
        }

        let body = Value::Object(body);
        self.schemas.validate(RecordType::Granule, &body)?;
        serde_json::from_value(body)
            .map_err(|e| PipelineError::validation(RecordType::Granule, e.to_string()))
    }

    /// Build the PDR record, if the message carries a PDR section.
    pub fn build_pdr(
        &self,
        message: &CanonicalMessage,
        now: i64,
    ) -> Result<Option<PdrRecord>, PipelineError> {
        let Some(section) = &message.pdr else {
            return Ok(None);
        };
        let invalid = |what: &str| PipelineError::validation(RecordType::Pdr, what.to_string());
        let pdr_name = section.name.clone().ok_or_else(|| invalid("PDR section has no name"))?;
        let collection_id = message
            .collection_id
            .clone()
            .ok_or_else(|| invalid("message has no collection"))?;
        let provider = message
            .provider
            .clone()
            .ok_or_else(|| invalid("message has no provider"))?;

        let stats = PdrStats::new(section.running, section.completed, section.failed);
        let created_at = message.created_at.unwrap_or(now);
        let record = PdrRecord {
            pdr_name,
            collection_id,
            provider,
            status: message.status,
            progress: stats.progress(),
            stats,
            execution: Some(message.execution_arn.clone()),
            pan_sent: section.pan_sent,
            pan_message: section.pan_message.clone(),
            error: message.error.clone(),
            created_at,
            updated_at: now,
            duration: duration_secs(created_at, now),
        };
        let body = serde_json::to_value(&record)
            .map_err(|e| PipelineError::validation(RecordType::Pdr, e.to_string()))?;
        self.schemas.validate(RecordType::Pdr, &body)?;
        Ok(Some(record))
    }
}
