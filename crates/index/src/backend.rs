use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::document::{DocId, WriteOutcome};
use crate::error::IndexError;
use crate::query::{SearchHit, SearchQuery, SearchResponse};

/// A document search engine holding one or more named indices.
///
/// ## Addressing
///
/// Every document is addressed by `(index, DocId)`. Writes are
/// create-or-replace; the backend does not version documents.
///
/// ## Search
///
/// `search` is scroll-paginated: each response carries a token for the next
/// batch until the result set is exhausted. [`scroll_all`] drains one.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static`; one client is shared by
/// every component through an `Arc`.
#[async_trait]
pub trait IndexBackend: Send + Sync + 'static {
    /// Fetch a document body, `Ok(None)` if absent.
    async fn get(&self, index: &str, id: &DocId) -> Result<Option<Value>, IndexError>;

    /// Create or replace a document.
    async fn index(&self, index: &str, id: &DocId, body: Value)
        -> Result<WriteOutcome, IndexError>;

    /// Merge `partial` into an existing document's top-level fields.
    ///
    /// If the document is missing, writes `upsert` when given, otherwise
    /// returns `Err(IndexError::NotFound)`.
    async fn update(
        &self,
        index: &str,
        id: &DocId,
        partial: Map<String, Value>,
        upsert: Option<Value>,
    ) -> Result<(), IndexError>;

    /// Remove a document. Returns whether it existed.
    async fn delete(&self, index: &str, id: &DocId) -> Result<bool, IndexError>;

    async fn search(&self, index: &str, query: &SearchQuery)
        -> Result<SearchResponse, IndexError>;
}

/// Run `query` and follow scroll tokens until the result set is exhausted.
pub async fn scroll_all<B>(
    backend: &B,
    index: &str,
    query: SearchQuery,
) -> Result<Vec<SearchHit>, IndexError>
where
    B: IndexBackend + ?Sized,
{
    let mut hits = Vec::new();
    let mut query = query;
    loop {
        let response = backend.search(index, &query).await?;
        hits.extend(response.hits);
        match response.scroll {
            Some(token) => query = query.scroll_after(Some(token)),
            None => return Ok(hits),
        }
    }
}
