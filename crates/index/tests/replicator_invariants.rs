use std::sync::Arc;

use cirrus_index::{DocId, DocType, IndexBackend, IndexReplicator, MemoryIndex, SearchQuery};
use cirrus_storage::conformance::make_granule;
use cirrus_storage::{Record, RecordKey};

const INDEX: &str = "cirrus";

async fn live_and_tombstone(index: &MemoryIndex, key: &RecordKey) -> (bool, bool) {
    let live = index
        .get(INDEX, &DocId::for_key(key))
        .await
        .unwrap()
        .is_some();
    let tomb = index
        .get(INDEX, &DocId::tombstone_for(key).unwrap())
        .await
        .unwrap()
        .is_some();
    (live, tomb)
}

#[tokio::test]
async fn live_document_and_tombstone_never_coexist() {
    let index = Arc::new(MemoryIndex::new());
    let rep = IndexReplicator::new(index.clone(), INDEX);
    let record: Record = make_granule("g-7", "MOD09GQ___006").into();
    let key = record.key();

    // upsert, delete, delete, upsert, upsert, delete, upsert
    let script = [true, false, false, true, true, false, true];
    for upsert in script {
        if upsert {
            rep.upsert(&record).await.unwrap();
        } else {
            rep.delete(&key).await.unwrap();
        }
        let (live, tomb) = live_and_tombstone(&index, &key).await;
        assert!(!(live && tomb), "live and tombstone coexist");
        assert_eq!(live, upsert);
    }
}

#[tokio::test]
async fn repeated_upserts_are_idempotent_in_count() {
    let index = Arc::new(MemoryIndex::new());
    let rep = IndexReplicator::new(index.clone(), INDEX);
    for _ in 0..5 {
        for i in 0..3 {
            rep.upsert(&make_granule(&format!("g-{i}"), "C___1").into())
                .await
                .unwrap();
        }
    }
    let response = index
        .search(INDEX, &SearchQuery::new(DocType::Granule).size(100))
        .await
        .unwrap();
    assert_eq!(response.total, 3);
}

#[tokio::test]
async fn tombstones_are_searchable_by_their_own_type() {
    let index = Arc::new(MemoryIndex::new());
    let rep = IndexReplicator::new(index.clone(), INDEX);
    rep.upsert(&make_granule("g-1", "C___1").into()).await.unwrap();
    rep.delete(&RecordKey::granule("g-1", "C___1")).await.unwrap();

    let live = index
        .search(INDEX, &SearchQuery::new(DocType::Granule))
        .await
        .unwrap();
    let deleted = index
        .search(
            INDEX,
            &SearchQuery::new(DocType::DeletedGranule).term("collectionId", "C___1"),
        )
        .await
        .unwrap();
    assert_eq!(live.total, 0);
    assert_eq!(deleted.total, 1);
    assert_eq!(deleted.hits[0].id.parent.as_deref(), Some("C___1"));
}
