use std::future::Future;

use cirrus_interchange::{ErrorInfo, Status};

use super::{make_execution, make_granule, make_pdr, Check, ContractArea};
use crate::{PrimaryStore, Record, RecordKey, StorageError};

pub(super) async fn crud_checks<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        Check::new(
            ContractArea::Crud,
            "put_then_get_returns_record",
            put_then_get_returns_record(factory).await,
        ),
        Check::new(
            ContractArea::Crud,
            "put_replaces_existing_record",
            put_replaces_existing_record(factory).await,
        ),
        Check::new(
            ContractArea::Crud,
            "get_missing_returns_not_found",
            get_missing_returns_not_found(factory).await,
        ),
        Check::new(
            ContractArea::Crud,
            "delete_removes_record",
            delete_removes_record(factory).await,
        ),
        Check::new(
            ContractArea::Crud,
            "delete_missing_returns_not_found",
            delete_missing_returns_not_found(factory).await,
        ),
        Check::new(
            ContractArea::Crud,
            "record_types_do_not_collide",
            record_types_do_not_collide(factory).await,
        ),
    ]
}

/// Every record kind reads back exactly as written.
async fn put_then_get_returns_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let records: Vec<Record> = vec![
        make_execution("arn:aws:states:us-east-1:1:execution:wf:a").into(),
        make_granule("g-1", "C___1").into(),
        make_pdr("p.PDR").into(),
    ];
    for r in &records {
        s.put(r.clone()).await.map_err(|e| e.to_string())?;
    }
    for r in &records {
        let got = s.get(&r.key()).await.map_err(|e| e.to_string())?;
        if &got != r {
            return Err(format!("{} read back as {:?}", r.key(), got));
        }
    }
    Ok(())
}

async fn put_replaces_existing_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut e = make_execution("arn:1");
    s.put(e.clone().into()).await.map_err(|e| e.to_string())?;
    e.status = Status::Failed;
    e.error = Some(ErrorInfo::new("States.Timeout", "timed out"));
    s.put(e.clone().into()).await.map_err(|e| e.to_string())?;

    let got = s
        .get(&RecordKey::execution("arn:1"))
        .await
        .map_err(|e| e.to_string())?;
    if got.status() != Status::Failed {
        return Err(format!("expected failed, got {}", got.status()));
    }
    Ok(())
}

async fn get_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get(&RecordKey::pdr("missing.PDR")).await {
        Err(StorageError::NotFound { key }) if key == RecordKey::pdr("missing.PDR") => Ok(()),
        other => Err(format!("expected NotFound, got {:?}", other)),
    }
}

async fn delete_removes_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let g: Record = make_granule("g-1", "C___1").into();
    s.put(g.clone()).await.map_err(|e| e.to_string())?;
    s.delete(&g.key()).await.map_err(|e| e.to_string())?;
    match s.get(&g.key()).await {
        Err(e) if e.is_not_found() => Ok(()),
        other => Err(format!("expected NotFound after delete, got {:?}", other)),
    }
}

async fn delete_missing_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.delete(&RecordKey::execution("arn:none")).await {
        Err(e) if e.is_not_found() => Ok(()),
        other => Err(format!("expected NotFound, got {:?}", other)),
    }
}

/// An execution ARN and a PDR name with the same text are distinct records.
async fn record_types_do_not_collide<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put(make_execution("same").into())
        .await
        .map_err(|e| e.to_string())?;
    s.put(make_pdr("same").into())
        .await
        .map_err(|e| e.to_string())?;
    s.delete(&RecordKey::pdr("same"))
        .await
        .map_err(|e| e.to_string())?;
    s.get(&RecordKey::execution("same"))
        .await
        .map_err(|e| format!("execution lost with pdr delete: {e}"))?;
    Ok(())
}
