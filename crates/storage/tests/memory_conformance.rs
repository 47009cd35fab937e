use cirrus_storage::conformance::{check_primary_store, ContractArea};
use cirrus_storage::MemoryStore;

#[tokio::test]
async fn memory_store_honours_primary_store_contract() {
    let report = check_primary_store(|| async { MemoryStore::new() }).await;
    for area in ContractArea::ALL {
        assert!(report.checks_in(area) > 0, "no checks ran for {area}");
    }
    assert!(report.is_conforming(), "{report}");
}
