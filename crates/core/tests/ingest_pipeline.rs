use std::sync::Arc;
use std::time::Duration;

use cirrus_core::{Pipeline, PipelineError, RetryPolicy, WritePolicy};
use cirrus_index::{DocType, IndexBackend, IndexReplicator, MemoryIndex, SearchQuery, DEFAULT_INDEX};
use cirrus_interchange::Status;
use cirrus_storage::{MemoryStore, PrimaryStore, Record, RecordKey};
use serde_json::{json, Value};

const ARN: &str = "arn:aws:states:us-east-1:123456789012:execution:IngestGranule:abc-123";

struct Harness {
    store: Arc<MemoryStore>,
    index: Arc<MemoryIndex>,
    pipeline: Pipeline,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(MemoryIndex::new());
    let pipeline = Pipeline::with_retry(
        store.clone(),
        IndexReplicator::new(index.clone(), DEFAULT_INDEX),
        WritePolicy::default(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    )
    .unwrap();
    Harness {
        store,
        index,
        pipeline,
    }
}

fn workflow_message(status: &str, payload: Value, exception: Value) -> Value {
    json!({
        "cumulus_meta": {
            "execution_arn": ARN,
            "workflow_start_time": 1_700_000_000_000i64,
            "workflow_stop_time": 1_700_000_060_000i64
        },
        "meta": {
            "status": status,
            "workflow_name": "IngestGranule",
            "collection": {"name": "MOD09GQ", "version": "006"},
            "provider": {"id": "s3_provider"}
        },
        "payload": payload,
        "exception": exception
    })
}

fn sns(message: &Value) -> Value {
    json!({
        "EventSource": "aws:sns",
        "Sns": {"Message": message.to_string()}
    })
}

async fn indexed(index: &MemoryIndex, doc_type: DocType) -> Vec<Value> {
    index
        .search(DEFAULT_INDEX, &SearchQuery::new(doc_type).size(1000))
        .await
        .unwrap()
        .hits
        .into_iter()
        .map(|h| h.body)
        .collect()
}

#[tokio::test]
async fn failed_execution_with_one_granule_and_no_pdr() {
    let h = harness();
    let event = sns(&workflow_message(
        "failed",
        json!({"granules": [{"granuleId": "MOD09GQ.A0000001", "files": []}]}),
        json!({"Error": "CumulusMessageAdapterExecutionError", "Cause": "boom"}),
    ));

    let result = h.pipeline.handle_payload(&event).await.unwrap();
    assert_eq!(result.execution.status, Status::Failed);
    assert!(result.pdr.is_none());
    assert_eq!(result.granules.len(), 1);
    assert_eq!(result.write.written, 2);
    assert_eq!(result.write.replicated, 2);

    let execution = h.store.get(&RecordKey::execution(ARN)).await.unwrap();
    assert_eq!(execution.status(), Status::Failed);
    let granule = h
        .store
        .get(&RecordKey::granule("MOD09GQ.A0000001", "MOD09GQ___006"))
        .await
        .unwrap();
    match granule {
        Record::Granule(g) => {
            assert_eq!(g.status, Status::Failed);
            assert_eq!(g.error.unwrap().error, "CumulusMessageAdapterExecutionError");
            assert_eq!(g.execution.as_deref(), Some(ARN));
        }
        other => panic!("unexpected record {other:?}"),
    }
    assert_eq!(h.store.len(), 2);

    let executions = indexed(&h.index, DocType::Execution).await;
    let granules = indexed(&h.index, DocType::Granule).await;
    assert_eq!(executions.len(), 1);
    assert_eq!(granules.len(), 1);
    assert_eq!(executions[0]["error"]["Error"], json!("CumulusMessageAdapterExecutionError"));
    assert!(indexed(&h.index, DocType::Pdr).await.is_empty());
}

#[tokio::test]
async fn redelivery_is_idempotent() {
    let h = harness();
    let event = workflow_message(
        "completed",
        json!({"granules": [{"granuleId": "g-1"}, {"granuleId": "g-2"}]}),
        Value::Null,
    );
    h.pipeline.handle_payload(&event).await.unwrap();
    h.pipeline.handle_payload(&event).await.unwrap();

    assert_eq!(h.store.len(), 3);
    assert_eq!(indexed(&h.index, DocType::Granule).await.len(), 2);
    assert_eq!(indexed(&h.index, DocType::Execution).await.len(), 1);
}

#[tokio::test]
async fn invalid_granules_do_not_block_execution_and_pdr() {
    let h = harness();
    let event = workflow_message(
        "running",
        json!({
            "pdr": {"name": "MOD09GQ.PDR"},
            "running": [ARN],
            "granules": [{"noGranuleId": true}]
        }),
        Value::Null,
    );
    let result = h.pipeline.handle_payload(&event).await.unwrap();
    assert!(result.granule_error.is_some());
    assert!(result.pdr_error.is_none());
    assert!(result.granules.is_empty());
    assert_eq!(result.pdr.as_ref().unwrap().stats.processing, 1);

    h.store.get(&RecordKey::execution(ARN)).await.unwrap();
    h.store.get(&RecordKey::pdr("MOD09GQ.PDR")).await.unwrap();
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn late_running_message_keeps_terminal_status() {
    let h = harness();
    h.pipeline
        .handle_payload(&workflow_message("completed", json!({}), Value::Null))
        .await
        .unwrap();
    let result = h
        .pipeline
        .handle_payload(&workflow_message("running", json!({}), Value::Null))
        .await
        .unwrap();
    assert_eq!(result.execution.status, Status::Completed);
    let stored = h.store.get(&RecordKey::execution(ARN)).await.unwrap();
    assert_eq!(stored.status(), Status::Completed);
}

#[tokio::test]
async fn malformed_message_is_rejected() {
    let h = harness();
    let event = json!({"EventSource": "aws:sns", "Sns": {"Message": "{not json"}});
    let err = h.pipeline.handle_payload(&event).await.unwrap_err();
    assert!(matches!(err, PipelineError::MalformedMessage(_)));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn batch_failures_are_isolated() {
    let h = harness();
    let good = sns(&workflow_message("completed", json!({}), Value::Null));
    let bad = json!({"EventSource": "aws:sns", "Sns": {"Message": "[]"}});
    let batch = json!({"Records": [good, bad]});

    let summary = h.pipeline.handle_batch(&batch).await;
    assert_eq!(summary.messages, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].position, 1);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn throttled_store_is_retried_during_ingest() {
    let h = harness();
    h.store.throttle_next(2);
    let event = sns(&workflow_message(
        "completed",
        json!({"granules": [{"granuleId": "MOD09GQ.A0000003"}]}),
        Value::Null,
    ));

    let result = h.pipeline.handle_payload(&event).await.unwrap();
    assert_eq!(result.write.written, 2);
    assert_eq!(result.write.replicated, 2);
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn unavailable_index_does_not_leave_stores_out_of_sync() {
    let h = harness();
    h.index.unavailable_next(1);
    let event = sns(&workflow_message(
        "completed",
        json!({"granules": [{"granuleId": "MOD09GQ.A0000004"}]}),
        Value::Null,
    ));

    let result = h.pipeline.handle_payload(&event).await.unwrap();
    assert_eq!(result.write.replicated, 2);
    assert_eq!(result.write.replication_failed, 0);
    assert_eq!(indexed(&h.index, DocType::Execution).await.len(), 1);
    assert_eq!(indexed(&h.index, DocType::Granule).await.len(), 1);
}

#[tokio::test]
async fn store_throttled_past_the_budget_surfaces_transient_backend() {
    let h = harness();
    h.store.throttle_next(10);
    let event = sns(&workflow_message("completed", json!({}), Value::Null));

    let err = h.pipeline.handle_payload(&event).await.unwrap_err();
    assert!(matches!(err, PipelineError::TransientBackend(_)));
    assert!(err.is_transient());
}
