use std::collections::HashSet;
use std::future::Future;

use super::{make_execution, make_granule, Check, ContractArea};
use crate::{
    collect_records, PrimaryStore, RecordFilter, RecordKey, RecordType, ScanRequest,
};

pub(super) async fn scan_checks<S, F, Fut>(factory: &F) -> Vec<Check>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        Check::new(
            ContractArea::Scans,
            "scan_of_empty_store_ends_immediately",
            scan_of_empty_store_ends_immediately(factory).await,
        ),
        Check::new(
            ContractArea::Scans,
            "paged_scan_visits_every_record_once",
            paged_scan_visits_every_record_once(factory).await,
        ),
        Check::new(
            ContractArea::Scans,
            "scan_is_scoped_to_record_type",
            scan_is_scoped_to_record_type(factory).await,
        ),
        Check::new(
            ContractArea::Scans,
            "filter_does_not_end_scan_early",
            filter_does_not_end_scan_early(factory).await,
        ),
        Check::new(
            ContractArea::Scans,
            "updated_window_is_inclusive",
            updated_window_is_inclusive(factory).await,
        ),
    ]
}

async fn scan_of_empty_store_ends_immediately<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let page = s
        .scan_page(ScanRequest::new(RecordType::Execution, 10))
        .await
        .map_err(|e| e.to_string())?;
    if !page.records.is_empty() || page.next.is_some() {
        return Err(format!("expected empty final page, got {:?}", page));
    }
    Ok(())
}

async fn paged_scan_visits_every_record_once<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for i in 0..23 {
        s.put(make_execution(&format!("arn:exec:{i:02}")).into())
            .await
            .map_err(|e| e.to_string())?;
    }

    let mut seen = HashSet::new();
    let mut cursor = None;
    let mut pages = 0;
    loop {
        let page = s
            .scan_page(ScanRequest::new(RecordType::Execution, 5).starting_after(cursor))
            .await
            .map_err(|e| e.to_string())?;
        pages += 1;
        if page.records.len() > 5 {
            return Err(format!("page of {} exceeds limit 5", page.records.len()));
        }
        for r in page.records {
            if !seen.insert(r.key()) {
                return Err(format!("{} returned twice", r.key()));
            }
        }
        cursor = page.next;
        if cursor.is_none() {
            break;
        }
        if pages > 100 {
            return Err("scan did not terminate".to_string());
        }
    }
    if seen.len() != 23 {
        return Err(format!("expected 23 records, saw {}", seen.len()));
    }
    Ok(())
}

async fn scan_is_scoped_to_record_type<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.put(make_execution("arn:1").into())
        .await
        .map_err(|e| e.to_string())?;
    s.put(make_granule("g-1", "C___1").into())
        .await
        .map_err(|e| e.to_string())?;
    let granules = collect_records(&s, ScanRequest::new(RecordType::Granule, 10))
        .await
        .map_err(|e| e.to_string())?;
    let keys: Vec<RecordKey> = granules.iter().map(|r| r.key()).collect();
    if keys != vec![RecordKey::granule("g-1", "C___1")] {
        return Err(format!("unexpected granule scan result {:?}", keys));
    }
    Ok(())
}

/// A page that evaluated only non-matching items is empty but not final.
async fn filter_does_not_end_scan_early<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for i in 0..12 {
        let mut g = make_granule(&format!("g-{i:02}"), "C___1");
        let provider = if i == 11 { "wanted" } else { "other" };
        g.provider = Some(provider.to_string());
        s.put(g.into()).await.map_err(|e| e.to_string())?;
    }
    let filter = RecordFilter {
        provider: Some("wanted".to_string()),
        ..RecordFilter::default()
    };
    let found = collect_records(
        &s,
        ScanRequest::new(RecordType::Granule, 4).with_filter(filter),
    )
    .await
    .map_err(|e| e.to_string())?;
    if found.len() != 1 {
        return Err(format!("expected 1 matching granule, got {}", found.len()));
    }
    Ok(())
}

async fn updated_window_is_inclusive<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PrimaryStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (arn, updated_at) in [("arn:a", 100), ("arn:b", 200), ("arn:c", 300)] {
        let mut e = make_execution(arn);
        e.updated_at = updated_at;
        s.put(e.into()).await.map_err(|e| e.to_string())?;
    }
    let filter = RecordFilter {
        updated_from: Some(200),
        updated_to: Some(300),
        ..RecordFilter::default()
    };
    let found = collect_records(
        &s,
        ScanRequest::new(RecordType::Execution, 10).with_filter(filter),
    )
    .await
    .map_err(|e| e.to_string())?;
    if found.len() != 2 {
        return Err(format!("expected 2 records in window, got {}", found.len()));
    }
    Ok(())
}
