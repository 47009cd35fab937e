use std::future::Future;

use super::{make_execution, make_granule, make_pdr, Check, ContractArea};
use crate::{PrimaryStore, Record};

pub(super) async fn transaction_checks<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        Check::new(
            ContractArea::Transactions,
            "transaction_writes_every_record",
            transaction_writes_every_record(factory).await,
        ),
        Check::new(
            ContractArea::Transactions,
            "duplicate_keys_cancel_whole_transaction",
            duplicate_keys_cancel_whole_transaction(factory).await,
        ),
        Check::new(
            ContractArea::Transactions,
            "empty_transaction_is_a_no_op",
            empty_transaction_is_a_no_op(factory).await,
        ),
    ]
}

async fn transaction_writes_every_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let records: Vec<Record> = vec![
        make_execution("arn:1").into(),
        make_granule("g-1", "C___1").into(),
        make_granule("g-2", "C___1").into(),
        make_pdr("p.PDR").into(),
    ];
    s.transact_write(records.clone())
        .await
        .map_err(|e| e.to_string())?;
    for r in &records {
        s.get(&r.key())
            .await
            .map_err(|e| format!("{} missing after transaction: {e}", r.key()))?;
    }
    Ok(())
}

/// Two writes of the same key in one transaction are rejected, and neither
/// that key nor any other record of the transaction becomes visible.
async fn duplicate_keys_cancel_whole_transaction<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let records: Vec<Record> = vec![
        make_execution("arn:1").into(),
        make_granule("g-1", "C___1").into(),
        make_granule("g-1", "C___1").into(),
    ];
    if s.transact_write(records).await.is_ok() {
        return Err("transaction with duplicate keys was accepted".to_string());
    }
    match s.get(&Record::from(make_execution("arn:1")).key()).await {
        Err(e) if e.is_not_found() => Ok(()),
        other => Err(format!("partial transaction applied: {:?}", other)),
    }
}

async fn empty_transaction_is_a_no_op<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.transact_write(Vec::new())
        .await
        .map_err(|e| e.to_string())
}
