//! In-process [`IndexBackend`] for tests and the local operator harness.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::backend::IndexBackend;
use crate::document::{DocId, IndexDocument, WriteOutcome};
use crate::error::IndexError;
use crate::query::{ScrollToken, SearchHit, SearchQuery, SearchResponse, SortOrder};

type Documents = BTreeMap<DocId, Value>;

#[derive(Default)]
struct Inner {
    indices: BTreeMap<String, Documents>,
    rejected: HashSet<DocId>,
    unavailable_remaining: usize,
}

#[derive(Default)]
pub struct MemoryIndex {
    inner: Mutex<Inner>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: impl IntoIterator<Item = IndexDocument>) -> Self {
        let index = Self::new();
        {
            let mut inner = index.inner.lock().unwrap_or_else(|e| e.into_inner());
            for doc in documents {
                inner
                    .indices
                    .entry(doc.index)
                    .or_default()
                    .insert(doc.id, doc.body);
            }
        }
        index
    }

    /// Every document across all indices, in address order.
    pub fn documents(&self) -> Vec<IndexDocument> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        inner
            .indices
            .iter()
            .flat_map(|(index, docs)| {
                docs.iter().map(move |(id, body)| IndexDocument {
                    index: index.clone(),
                    id: id.clone(),
                    body: body.clone(),
                })
            })
            .collect()
    }

    /// Number of documents in one index.
    pub fn count(&self, index: &str) -> usize {
        self.lock()
            .map(|inner| inner.indices.get(index).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Make every write to `id` fail with a backend error.
    pub fn reject_writes_for(&self, id: DocId) {
        if let Ok(mut inner) = self.lock() {
            inner.rejected.insert(id);
        }
    }

    /// Make the next `calls` operations fail with `Unavailable`.
    pub fn unavailable_next(&self, calls: usize) {
        if let Ok(mut inner) = self.lock() {
            inner.unavailable_remaining = calls;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, IndexError> {
        self.inner
            .lock()
            .map_err(|_| IndexError::Backend("memory index lock poisoned".to_string()))
    }

    fn enter(&self) -> Result<MutexGuard<'_, Inner>, IndexError> {
        let mut inner = self.lock()?;
        if inner.unavailable_remaining > 0 {
            inner.unavailable_remaining -= 1;
            return Err(IndexError::Unavailable("cluster not ready".to_string()));
        }
        Ok(inner)
    }
}

fn check_writable(inner: &Inner, id: &DocId) -> Result<(), IndexError> {
    if inner.rejected.contains(id) {
        return Err(IndexError::Backend(format!("write rejected for {}", id)));
    }
    Ok(())
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        // Missing values sort last.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn parse_scroll(token: &ScrollToken) -> Result<usize, IndexError> {
    token
        .0
        .parse()
        .map_err(|_| IndexError::InvalidScroll(token.0.clone()))
}

#[async_trait]
impl IndexBackend for MemoryIndex {
    async fn get(&self, index: &str, id: &DocId) -> Result<Option<Value>, IndexError> {
        let inner = self.enter()?;
        Ok(inner.indices.get(index).and_then(|d| d.get(id)).cloned())
    }

    async fn index(
        &self,
        index: &str,
        id: &DocId,
        body: Value,
    ) -> Result<WriteOutcome, IndexError> {
        let mut inner = self.enter()?;
        check_writable(&inner, id)?;
        let previous = inner
            .indices
            .entry(index.to_string())
            .or_default()
            .insert(id.clone(), body);
        Ok(match previous {
            Some(_) => WriteOutcome::Updated,
            None => WriteOutcome::Created,
        })
    }

    async fn update(
        &self,
        index: &str,
        id: &DocId,
        partial: Map<String, Value>,
        upsert: Option<Value>,
    ) -> Result<(), IndexError> {
        let mut inner = self.enter()?;
        check_writable(&inner, id)?;
        let docs = inner.indices.entry(index.to_string()).or_default();
        match docs.get_mut(id) {
            Some(Value::Object(existing)) => {
                existing.extend(partial);
                Ok(())
            }
            Some(_) => Err(IndexError::Backend(format!("{} is not an object", id))),
            None => match upsert {
                Some(body) => {
                    docs.insert(id.clone(), body);
                    Ok(())
                }
                None => Err(IndexError::NotFound {
                    index: index.to_string(),
                    id: id.clone(),
                }),
            },
        }
    }

    async fn delete(&self, index: &str, id: &DocId) -> Result<bool, IndexError> {
        let mut inner = self.enter()?;
        check_writable(&inner, id)?;
        Ok(inner
            .indices
            .get_mut(index)
            .and_then(|d| d.remove(id))
            .is_some())
    }

    async fn search(
        &self,
        index: &str,
        query: &SearchQuery,
    ) -> Result<SearchResponse, IndexError> {
        let inner = self.enter()?;
        let offset = match &query.scroll {
            Some(token) => parse_scroll(token)?,
            None => 0,
        };
        let Some(docs) = inner.indices.get(index) else {
            return Ok(SearchResponse::default());
        };

        let mut matching: Vec<(&DocId, &Value)> = docs
            .iter()
            .filter(|(id, body)| id.doc_type == query.doc_type && query.matches(body))
            .collect();
        if let Some(sort) = &query.sort {
            matching.sort_by(|(a_id, a), (b_id, b)| {
                let ord = compare_values(a.get(&sort.field), b.get(&sort.field));
                let ord = match sort.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                };
                ord.then_with(|| a_id.cmp(b_id))
            });
        }

        let total = matching.len();
        let size = query.size.max(1);
        let hits: Vec<SearchHit> = matching
            .into_iter()
            .skip(offset)
            .take(size)
            .map(|(id, body)| SearchHit {
                id: id.clone(),
                body: body.clone(),
            })
            .collect();
        let end = offset + hits.len();
        let scroll = (end < total).then(|| ScrollToken(end.to_string()));

        Ok(SearchResponse {
            hits,
            total: total as u64,
            scroll,
        })
    }
}
