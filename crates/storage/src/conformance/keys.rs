use std::future::Future;

use super::{make_granule, Check, ContractArea};
use crate::{PrimaryStore, RecordKey};

pub(super) async fn key_checks<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        Check::new(
            ContractArea::Keys,
            "same_granule_id_in_two_collections_is_two_records",
            same_granule_id_in_two_collections_is_two_records(factory).await,
        ),
        Check::new(
            ContractArea::Keys,
            "granule_lookup_requires_collection",
            granule_lookup_requires_collection(factory).await,
        ),
    ]
}

async fn same_granule_id_in_two_collections_is_two_records<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put(make_granule("g-1", "A___1").into())
        .await
        .map_err(|e| e.to_string())?;
    s.put(make_granule("g-1", "B___1").into())
        .await
        .map_err(|e| e.to_string())?;

    for collection in ["A___1", "B___1"] {
        let got = s
            .get(&RecordKey::granule("g-1", collection))
            .await
            .map_err(|e| format!("{collection}: {e}"))?;
        if got.collection_id() != Some(collection) {
            return Err(format!(
                "expected collection {collection}, got {:?}",
                got.collection_id()
            ));
        }
    }
    Ok(())
}

async fn granule_lookup_requires_collection<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put(make_granule("g-1", "A___1").into())
        .await
        .map_err(|e| e.to_string())?;
    match s.get(&RecordKey::granule("g-1", "Z___9")).await {
        Err(e) if e.is_not_found() => Ok(()),
        other => Err(format!("expected NotFound, got {:?}", other)),
    }
}
