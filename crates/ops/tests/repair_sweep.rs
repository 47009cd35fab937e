use std::sync::Arc;
use std::time::Duration;

use cirrus_core::{Pipeline, RetryPolicy, WritePolicy};
use cirrus_index::{IndexReplicator, MemoryIndex, DEFAULT_INDEX};
use cirrus_interchange::Status;
use cirrus_ops::{
    ExecutionDescription, ExecutionStatus, MemoryOrchestrator, RepairSettings,
    StaleExecutionSweep,
};
use cirrus_storage::clock::now_millis;
use cirrus_storage::{MemoryStore, PrimaryStore, Record, RecordKey};
use serde_json::{json, Value};

const ARN: &str = "arn:aws:states:us-east-1:123456789012:execution:IngestGranule:stuck-1";

struct Harness {
    store: Arc<MemoryStore>,
    index: Arc<MemoryIndex>,
    orchestrator: Arc<MemoryOrchestrator>,
    pipeline: Arc<Pipeline>,
    sweep: StaleExecutionSweep,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(MemoryIndex::new());
    let orchestrator = Arc::new(MemoryOrchestrator::new());
    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };
    let pipeline = Arc::new(
        Pipeline::with_retry(
            store.clone(),
            IndexReplicator::new(index.clone(), DEFAULT_INDEX),
            WritePolicy::default(),
            retry,
        )
        .unwrap(),
    );
    let sweep = StaleExecutionSweep::new(
        pipeline.clone(),
        orchestrator.clone(),
        RepairSettings::default(),
        retry,
    );
    Harness {
        store,
        index,
        orchestrator,
        pipeline,
        sweep,
    }
}

fn message(arn: &str, status: &str, started_at: i64, payload: Value) -> Value {
    json!({
        "cumulus_meta": {
            "execution_arn": arn,
            "workflow_start_time": started_at
        },
        "meta": {
            "status": status,
            "workflow_name": "IngestGranule",
            "collection": {"name": "MOD09GQ", "version": "006"},
            "provider": {"id": "s3_provider"}
        },
        "payload": payload
    })
}

/// A running execution with two granules and a PDR, started `age_ms` ago.
async fn seed_running(h: &Harness, arn: &str, age_ms: i64) {
    let payload = json!({
        "pdr": {"name": "STUCK.PDR"},
        "running": [arn],
        "granules": [{"granuleId": "g-1"}, {"granuleId": "g-2"}]
    });
    h.pipeline
        .handle_payload(&message(arn, "running", now_millis() - age_ms, payload))
        .await
        .unwrap();
}

async fn stored_status(h: &Harness, key: &RecordKey) -> Status {
    h.store.get(key).await.unwrap().status()
}

fn granule_key(id: &str) -> RecordKey {
    RecordKey::granule(id, "MOD09GQ___006")
}

const HOUR_MS: i64 = 60 * 60 * 1000;

#[tokio::test]
async fn missing_execution_is_failed_and_propagated() {
    let h = harness();
    seed_running(&h, ARN, HOUR_MS).await;

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.propagated, 3);
    assert_eq!(summary.errors, 0);

    match h.store.get(&RecordKey::execution(ARN)).await.unwrap() {
        Record::Execution(e) => {
            assert_eq!(e.status, Status::Failed);
            assert_eq!(e.error.unwrap().error, "Not Found");
            assert_eq!(e.workflow_type.as_deref(), Some("IngestGranule"));
        }
        other => panic!("unexpected record {other:?}"),
    }
    for id in ["g-1", "g-2"] {
        match h.store.get(&granule_key(id)).await.unwrap() {
            Record::Granule(g) => {
                assert_eq!(g.status, Status::Failed);
                assert_eq!(g.error.unwrap().error, "Not Found");
            }
            other => panic!("unexpected record {other:?}"),
        }
    }
    assert_eq!(
        stored_status(&h, &RecordKey::pdr("STUCK.PDR")).await,
        Status::Failed
    );

    let replicator = h.pipeline.writer().replicator();
    let doc = replicator.get(&granule_key("g-1")).await.unwrap().unwrap();
    assert_eq!(doc["status"], json!("failed"));
    assert_eq!(doc["error"]["Error"], json!("Not Found"));
    let doc = replicator.get(&RecordKey::execution(ARN)).await.unwrap().unwrap();
    assert_eq!(doc["status"], json!("failed"));
}

#[tokio::test]
async fn stale_running_execution_is_stopped() {
    let h = harness();
    seed_running(&h, ARN, 6 * HOUR_MS).await;
    h.orchestrator.insert(ExecutionDescription {
        status: ExecutionStatus::Running,
        ..ExecutionDescription::not_found(ARN)
    });

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.stopped, 1);
    assert_eq!(summary.propagated, 3);
    assert_eq!(h.orchestrator.stopped(), vec![ARN.to_string()]);

    match h.store.get(&granule_key("g-2")).await.unwrap() {
        Record::Granule(g) => {
            assert_eq!(g.status, Status::Failed);
            assert_eq!(g.error.unwrap().error, "Stopped By Operator");
        }
        other => panic!("unexpected record {other:?}"),
    }
}

#[tokio::test]
async fn running_execution_within_deadline_is_skipped() {
    let h = harness();
    seed_running(&h, ARN, HOUR_MS).await;
    h.orchestrator.insert(ExecutionDescription {
        status: ExecutionStatus::Running,
        ..ExecutionDescription::not_found(ARN)
    });

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert!(h.orchestrator.stopped().is_empty());
    assert_eq!(
        stored_status(&h, &RecordKey::execution(ARN)).await,
        Status::Running
    );
}

#[tokio::test]
async fn succeeded_execution_is_redriven_with_its_output() {
    let h = harness();
    let started = now_millis() - HOUR_MS;
    seed_running(&h, ARN, HOUR_MS).await;
    let output = message(
        ARN,
        "running",
        started,
        json!({"granules": [{"granuleId": "g-1"}, {"granuleId": "g-2"}]}),
    );
    h.orchestrator.insert(ExecutionDescription {
        status: ExecutionStatus::Succeeded,
        output: Some(output),
        ..ExecutionDescription::not_found(ARN)
    });

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.redriven, 1);
    assert_eq!(summary.propagated, 0);
    assert_eq!(
        stored_status(&h, &RecordKey::execution(ARN)).await,
        Status::Completed
    );
    assert_eq!(stored_status(&h, &granule_key("g-1")).await, Status::Completed);
}

#[tokio::test]
async fn failed_execution_is_redriven_with_its_input_and_error() {
    let h = harness();
    seed_running(&h, ARN, HOUR_MS).await;
    h.orchestrator.insert(ExecutionDescription {
        status: ExecutionStatus::Failed,
        input: Some(message(ARN, "running", now_millis() - HOUR_MS, json!({}))),
        error: Some("States.Timeout".to_string()),
        cause: Some("task timed out".to_string()),
        ..ExecutionDescription::not_found(ARN)
    });

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.redriven, 1);
    match h.store.get(&RecordKey::execution(ARN)).await.unwrap() {
        Record::Execution(e) => {
            assert_eq!(e.status, Status::Failed);
            let error = e.error.unwrap();
            assert_eq!(error.error, "States.Timeout");
            assert_eq!(error.cause, "task timed out");
        }
        other => panic!("unexpected record {other:?}"),
    }
}

#[tokio::test]
async fn transient_orchestrator_errors_are_retried() {
    let h = harness();
    seed_running(&h, ARN, HOUR_MS).await;
    h.orchestrator.throttle_next(2);

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.errors, 0);
}

#[tokio::test]
async fn exhausted_retries_count_as_errors() {
    let h = harness();
    seed_running(&h, ARN, HOUR_MS).await;
    h.orchestrator.throttle_next(10);

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(
        stored_status(&h, &RecordKey::execution(ARN)).await,
        Status::Running
    );
}

#[tokio::test]
async fn terminal_executions_are_not_candidates() {
    let h = harness();
    h.pipeline
        .handle_payload(&message(ARN, "completed", now_millis(), json!({})))
        .await
        .unwrap();

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.examined, 0);
    assert_eq!(h.index.count(DEFAULT_INDEX), 1);
}

#[tokio::test]
async fn a_second_sweep_finds_nothing_left() {
    let h = harness();
    seed_running(&h, ARN, HOUR_MS).await;
    seed_running(&h, "arn:aws:states:us-east-1:123456789012:execution:IngestGranule:stuck-2", HOUR_MS)
        .await;

    let first = h.sweep.run().await.unwrap();
    assert_eq!(first.examined, 2);
    assert_eq!(first.not_found, 2);

    let second = h.sweep.run().await.unwrap();
    assert_eq!(second.examined, 0);
}

#[tokio::test]
async fn unavailable_index_during_discovery_is_retried() {
    let h = harness();
    seed_running(&h, ARN, HOUR_MS).await;
    h.index.unavailable_next(2);

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.propagated, 3);
    assert_eq!(summary.errors, 0);
}

#[tokio::test]
async fn throttled_store_during_repair_is_retried() {
    let h = harness();
    seed_running(&h, ARN, HOUR_MS).await;
    h.store.throttle_next(2);

    let summary = h.sweep.run().await.unwrap();
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.errors, 0);
    match h.store.get(&RecordKey::execution(ARN)).await.unwrap() {
        Record::Execution(e) => {
            assert_eq!(e.status, Status::Failed);
            assert_eq!(
                e.error.unwrap().cause,
                format!("Execution {ARN} does not exist in the orchestrator")
            );
        }
        other => panic!("unexpected record {other:?}"),
    }
}
