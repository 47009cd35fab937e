//! Reconciliation: compare the primary store with the index.

use std::collections::BTreeMap;
use std::sync::Arc;

use cirrus_core::config::ReconcileConfig;
use cirrus_core::RetryPolicy;
use cirrus_index::{scroll_all, DocType, IndexBackend, IndexError, SearchQuery};
use cirrus_storage::{
    scan_pages_with, PrimaryStore, Record, RecordFilter, RecordKey, RecordType, ScanRequest,
    StorageError,
};
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::Value;

const SCAN_PAGE_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("reading primary store: {0}")]
    Storage(#[from] StorageError),

    #[error("reading index: {0}")]
    Index(#[from] IndexError),

    #[error("serializing record: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub record_type: RecordType,
    /// Inclusive lower bound on `updatedAt` (epoch ms).
    pub start_time: Option<i64>,
    /// Inclusive upper bound on `updatedAt` (epoch ms).
    pub end_time: Option<i64>,
    pub collection_id: Option<String>,
    pub provider: Option<String>,
    /// Natural id: ARN, granule id or PDR name.
    pub id: Option<String>,
}

impl Default for ReconcileRequest {
    fn default() -> Self {
        ReconcileRequest {
            record_type: RecordType::Granule,
            start_time: None,
            end_time: None,
            collection_id: None,
            provider: None,
            id: None,
        }
    }
}

impl ReconcileRequest {
    pub fn for_type(record_type: RecordType) -> Self {
        ReconcileRequest {
            record_type,
            ..Self::default()
        }
    }

    fn filter(&self) -> RecordFilter {
        RecordFilter {
            updated_from: self.start_time,
            updated_to: self.end_time,
            collection_id: self.collection_id.clone(),
            provider: self.provider.clone(),
            natural_id: self.id.clone(),
        }
    }

    fn query(&self) -> SearchQuery {
        let mut query = SearchQuery::new(DocType::for_record_type(self.record_type));
        if self.start_time.is_some() || self.end_time.is_some() {
            query = query.range("updatedAt", self.start_time, self.end_time);
        }
        if let Some(collection_id) = &self.collection_id {
            query = query.term("collectionId", collection_id.as_str());
        }
        if let Some(provider) = &self.provider {
            query = query.term("provider", provider.as_str());
        }
        if let Some(id) = &self.id {
            query = query.term(id_field(self.record_type), id.as_str());
        }
        query
    }
}

fn id_field(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::Execution => "arn",
        RecordType::Granule => "granuleId",
        RecordType::Pdr => "pdrName",
    }
}

/// A record present on both sides with differing payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub primary: Value,
    pub index: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub record_type: RecordType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    pub ok_count: usize,
    pub only_in_primary: Vec<Value>,
    pub only_in_index: Vec<Value>,
    pub with_conflicts: Vec<Conflict>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.only_in_primary.is_empty()
            && self.only_in_index.is_empty()
            && self.with_conflicts.is_empty()
    }
}

pub struct Reconciler {
    store: Arc<dyn PrimaryStore>,
    backend: Arc<dyn IndexBackend>,
    index: String,
    ignored_fields: Vec<String>,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        backend: Arc<dyn IndexBackend>,
        index: impl Into<String>,
        config: &ReconcileConfig,
    ) -> Self {
        Reconciler {
            store,
            backend,
            index: index.into(),
            ignored_fields: config.ignored_fields.clone(),
            retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for page reads on both sides.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Compare one record type within the request's window.
    ///
    /// Both sides are read in full before comparing. Transient read failures
    /// are retried; a read that still fails fails the call.
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
    ) -> Result<ReconciliationReport, ReconcileError> {
        let primary = self.primary_payloads(request).await?;
        let mut index = self.index_payloads(request).await?;

        let mut report = ReconciliationReport {
            record_type: request.record_type,
            start_time: request.start_time,
            end_time: request.end_time,
            ok_count: 0,
            only_in_primary: Vec::new(),
            only_in_index: Vec::new(),
            with_conflicts: Vec::new(),
        };

        for (key, primary_body) in primary {
            match index.remove(&IndexKey::Record(key)) {
                None => report.only_in_primary.push(primary_body),
                Some(index_body) => {
                    if self.strip(&primary_body) == self.strip(&index_body) {
                        report.ok_count += 1;
                    } else {
                        report.with_conflicts.push(Conflict {
                            primary: primary_body,
                            index: index_body,
                        });
                    }
                }
            }
        }
        report.only_in_index.extend(index.into_values());

        tracing::info!(
            record_type = %report.record_type,
            ok = report.ok_count,
            only_in_primary = report.only_in_primary.len(),
            only_in_index = report.only_in_index.len(),
            conflicts = report.with_conflicts.len(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// One report per record type, sharing the request's filters.
    pub async fn reconcile_all(
        &self,
        request: &ReconcileRequest,
    ) -> Result<Vec<ReconciliationReport>, ReconcileError> {
        let mut reports = Vec::with_capacity(RecordType::ALL.len());
        for record_type in RecordType::ALL {
            let request = ReconcileRequest {
                record_type,
                ..request.clone()
            };
            reports.push(self.reconcile(&request).await?);
        }
        Ok(reports)
    }

    async fn primary_payloads(
        &self,
        request: &ReconcileRequest,
    ) -> Result<BTreeMap<RecordKey, Value>, ReconcileError> {
        let scan =
            ScanRequest::new(request.record_type, SCAN_PAGE_SIZE).with_filter(request.filter());
        let store = self.store.as_ref();
        let retry = &self.retry;
        let records: Vec<Record> = scan_pages_with(scan, move |page: ScanRequest| {
            retry.run("scan_page", StorageError::is_transient, move || {
                store.scan_page(page.clone())
            })
        })
        .try_fold(Vec::new(), |mut acc, page| async move {
            acc.extend(page.records);
            Ok(acc)
        })
        .await?;
        records
            .into_iter()
            .map(|record| -> Result<_, ReconcileError> { Ok((record.key(), record.body()?)) })
            .collect()
    }

    /// Index documents keyed by the record they mirror. Documents that cannot
    /// be mapped to a record key are keyed by a synthetic key and so always
    /// land in `only_in_index`.
    async fn index_payloads(
        &self,
        request: &ReconcileRequest,
    ) -> Result<BTreeMap<IndexKey, Value>, ReconcileError> {
        let hits = self
            .retry
            .run("scroll index", IndexError::is_transient, || {
                scroll_all(self.backend.as_ref(), &self.index, request.query())
            })
            .await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let key = hit
                    .id
                    .record_key()
                    .or_else(|| {
                        Record::from_body(request.record_type, hit.body.clone())
                            .ok()
                            .map(|r| r.key())
                    })
                    .map_or_else(|| IndexKey::Unmapped(hit.id.to_string()), IndexKey::Record);
                (key, hit.body)
            })
            .collect())
    }

    fn strip(&self, body: &Value) -> Value {
        let mut body = body.clone();
        if let Value::Object(fields) = &mut body {
            for field in &self.ignored_fields {
                fields.remove(field);
            }
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum IndexKey {
    Record(RecordKey),
    Unmapped(String),
}
