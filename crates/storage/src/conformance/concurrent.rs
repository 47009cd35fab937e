use std::future::Future;
use std::sync::Arc;

use super::{make_granule, Check, ContractArea};
use crate::{collect_records, PrimaryStore, RecordKey, RecordType, ScanRequest};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn concurrency_checks<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        Check::new(
            ContractArea::Concurrency,
            "concurrent_puts_to_distinct_keys_all_land",
            concurrent_puts_to_distinct_keys_all_land(factory).await,
        ),
        Check::new(
            ContractArea::Concurrency,
            "concurrent_puts_to_one_key_leave_one_record",
            concurrent_puts_to_one_key_leave_one_record(factory).await,
        ),
    ]
}

async fn concurrent_puts_to_distinct_keys_all_land<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            s.put(make_granule(&format!("g-{i}"), "C___1").into()).await
        }));
    }
    for h in handles {
        h.await
            .map_err(|e| format!("task panicked: {e}"))?
            .map_err(|e| e.to_string())?;
    }
    for i in 0..N {
        storage
            .get(&RecordKey::granule(format!("g-{i}"), "C___1"))
            .await
            .map_err(|e| format!("g-{i}: {e}"))?;
    }
    Ok(())
}

/// Last writer wins; no interleaving produces a second record for one key.
async fn concurrent_puts_to_one_key_leave_one_record<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut g = make_granule("g-shared", "C___1");
            g.updated_at += i as i64;
            s.put(g.into()).await
        }));
    }
    for h in handles {
        h.await
            .map_err(|e| format!("task panicked: {e}"))?
            .map_err(|e| e.to_string())?;
    }
    let all = collect_records(storage.as_ref(), ScanRequest::new(RecordType::Granule, 100))
        .await
        .map_err(|e| e.to_string())?;
    if all.len() != 1 {
        return Err(format!("expected 1 record, found {}", all.len()));
    }
    Ok(())
}
