use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{DocId, DocType};

/// Opaque continuation token issued by a backend's `search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollToken(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

/// Inclusive numeric bounds on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFilter {
    pub field: String,
    pub gte: Option<i64>,
    pub lte: Option<i64>,
}

impl RangeFilter {
    pub fn contains(&self, value: i64) -> bool {
        self.gte.map_or(true, |gte| value >= gte) && self.lte.map_or(true, |lte| value <= lte)
    }
}

/// A filtered search over one document type.
///
/// Term filters are exact equality on top-level body fields; all filters are
/// ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub doc_type: DocType,
    pub terms: Vec<(String, Value)>,
    pub range: Option<RangeFilter>,
    pub sort: Option<Sort>,
    /// Maximum number of hits per response.
    pub size: usize,
    /// Continue a previous search; the other fields must be unchanged.
    pub scroll: Option<ScrollToken>,
}

impl SearchQuery {
    pub fn new(doc_type: DocType) -> Self {
        SearchQuery {
            doc_type,
            terms: Vec::new(),
            range: None,
            sort: None,
            size: 100,
            scroll: None,
        }
    }

    pub fn term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((field.into(), value.into()));
        self
    }

    pub fn range(mut self, field: impl Into<String>, gte: Option<i64>, lte: Option<i64>) -> Self {
        self.range = Some(RangeFilter {
            field: field.into(),
            gte,
            lte,
        });
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order,
        });
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn scroll_after(mut self, token: Option<ScrollToken>) -> Self {
        self.scroll = token;
        self
    }

    /// Whether a document body satisfies every filter of this query.
    pub fn matches(&self, body: &Value) -> bool {
        let terms_match = self
            .terms
            .iter()
            .all(|(field, expected)| body.get(field) == Some(expected));
        let range_match = match &self.range {
            Some(range) => body
                .get(&range.field)
                .and_then(Value::as_i64)
                .is_some_and(|v| range.contains(v)),
            None => true,
        };
        terms_match && range_match
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: DocId,
    pub body: Value,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// Number of documents matching the query across all pages.
    pub total: u64,
    /// `None` once the last hit has been returned.
    pub scroll: Option<ScrollToken>,
}
