//! Core data types shared by the harvest pipeline and the query service.

use chrono::NaiveDate;
use serde::Serialize;

/// One harvested catalog item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMetadata {
    /// Catalog identifier; primary key in the store.
    pub id: String,
    /// Collection the harvest pass assigned this item to.
    pub collection: String,
    pub title: String,
    /// Thumbnail URL, absent when the catalog has none.
    pub image_url: Option<String>,
    pub date: NaiveDate,
    pub year: i32,
    /// Normalized OCR text. Items without it are never indexed.
    pub full_text: Option<String>,
}

impl ItemMetadata {
    pub fn is_indexable(&self) -> bool {
        self.full_text.is_some()
    }
}

/// Why an item was left out of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The manifest lists no OCR text file, or fetching it failed.
    MissingFullText,
    /// The metadata has no title.
    MissingTitle,
    /// Metadata could not be fetched or decoded.
    MetadataUnavailable(String),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::MissingFullText => write!(f, "no full text"),
            DropReason::MissingTitle => write!(f, "missing title"),
            DropReason::MetadataUnavailable(why) => write!(f, "metadata unavailable: {}", why),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedItem {
    pub id: String,
    pub reason: DropReason,
}

/// Result of fetching one identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Complete item with full text, ready to load.
    Item(ItemMetadata),
    Dropped(DroppedItem),
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    /// Exact-match year filter.
    pub year: Option<i32>,
    /// Page size.
    pub limit: i64,
    /// Zero-based page number.
    pub page: i64,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, limit: i64) -> Self {
        Self {
            query: query.into(),
            year: None,
            limit,
            page: 0,
        }
    }

    pub fn offset(&self) -> i64 {
        self.page * self.limit
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub collection: String,
    pub title: String,
    /// ISO `YYYY-MM-DD`.
    pub date: String,
    pub year: i32,
    pub snippets: Vec<String>,
    #[serde(skip)]
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchMeta {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub returned: usize,
}

/// Full search response, serialized as the HTTP JSON contract.
///
/// Facets serialize as `[key, count]` pairs.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResult {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub years: Vec<(i32, i64)>,
    pub collections: Vec<(String, i64)>,
    pub meta: SearchMeta,
}

impl SearchResult {
    pub fn empty(q: &SearchQuery) -> Self {
        Self {
            query: q.query.clone(),
            results: Vec::new(),
            years: Vec::new(),
            collections: Vec::new(),
            meta: SearchMeta {
                total: 0,
                page: q.page,
                limit: q.limit,
                returned: 0,
            },
        }
    }
}
