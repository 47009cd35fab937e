//! Lazy, restartable page sequences over a [`PrimaryStore`].

use std::future::Future;

use futures::stream::{self, Stream, TryStreamExt};

use crate::error::StorageError;
use crate::record::Record;
use crate::traits::{Cursor, Page, PrimaryStore, ScanRequest};

enum ScanState {
    Next(Option<Cursor>),
    Done,
}

/// Stream the pages of a scan, one `scan_page` call per item.
///
/// The stream ends after the page whose `next` cursor is `None`. To resume an
/// interrupted scan, pass the last cursor seen as `request.cursor`.
pub fn scan_pages<'a, S>(
    store: &'a S,
    request: ScanRequest,
) -> impl Stream<Item = Result<Page, StorageError>> + Send + 'a
where
    S: PrimaryStore + ?Sized,
{
    scan_pages_with(request, move |page| store.scan_page(page))
}

/// Like [`scan_pages`], with `fetch` reading each page.
///
/// `fetch` is how callers put a retry policy around page reads.
pub fn scan_pages_with<'a, F, Fut>(
    request: ScanRequest,
    mut fetch: F,
) -> impl Stream<Item = Result<Page, StorageError>> + 'a
where
    F: FnMut(ScanRequest) -> Fut + 'a,
    Fut: Future<Output = Result<Page, StorageError>> + 'a,
{
    let start = ScanState::Next(request.cursor.clone());
    stream::try_unfold(start, move |state| {
        let pending = match state {
            ScanState::Done => None,
            ScanState::Next(cursor) => Some(fetch(ScanRequest {
                cursor,
                ..request.clone()
            })),
        };
        async move {
            let Some(pending) = pending else {
                return Ok(None);
            };
            let page = pending.await?;
            let next = match &page.next {
                Some(cursor) => ScanState::Next(Some(cursor.clone())),
                None => ScanState::Done,
            };
            Ok(Some((page, next)))
        }
    })
}

/// Drain a scan into memory. Fails if any page fails.
pub async fn collect_records<S>(store: &S, request: ScanRequest) -> Result<Vec<Record>, StorageError>
where
    S: PrimaryStore + ?Sized,
{
    scan_pages(store, request)
        .try_fold(Vec::new(), |mut acc, page| async move {
            acc.extend(page.records);
            Ok(acc)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::make_execution;
    use crate::{MemoryStore, RecordFilter, RecordType};
    use futures::StreamExt;

    #[tokio::test]
    async fn pages_until_sentinel() {
        let store = MemoryStore::new();
        for i in 0..25 {
            store
                .put(make_execution(&format!("arn:exec:{:03}", i)).into())
                .await
                .unwrap();
        }
        let pages: Vec<_> = scan_pages(&store, ScanRequest::new(RecordType::Execution, 10))
            .collect()
            .await;
        assert_eq!(pages.len(), 3);
        let sizes: Vec<usize> = pages.iter().map(|p| p.as_ref().unwrap().records.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn empty_store_yields_one_empty_page() {
        let store = MemoryStore::new();
        let records = collect_records(&store, ScanRequest::new(RecordType::Granule, 10))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn filtered_scan_skips_empty_pages_without_stopping() {
        let store = MemoryStore::new();
        for i in 0..30 {
            let mut e = make_execution(&format!("arn:exec:{:03}", i));
            if i == 29 {
                e.collection_id = Some("wanted___1".to_string());
            }
            store.put(e.into()).await.unwrap();
        }
        let filter = RecordFilter {
            collection_id: Some("wanted___1".to_string()),
            ..RecordFilter::default()
        };
        let request = ScanRequest::new(RecordType::Execution, 10).with_filter(filter);
        let records = collect_records(&store, request).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn scan_resumes_from_cursor() {
        let store = MemoryStore::new();
        for i in 0..6 {
            store
                .put(make_execution(&format!("arn:exec:{}", i)).into())
                .await
                .unwrap();
        }
        let first = store
            .scan_page(ScanRequest::new(RecordType::Execution, 4))
            .await
            .unwrap();
        let rest = collect_records(
            &store,
            ScanRequest::new(RecordType::Execution, 4).starting_after(first.next),
        )
        .await
        .unwrap();
        assert_eq!(first.records.len() + rest.len(), 6);
    }
}
