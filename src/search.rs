//! Query service: ranked, faceted, paginated full-text search.
//!
//! Free text is reduced to plain terms (letters and digits only), each
//! quoted and ANDed into an FTS5 match expression, so no user input is ever
//! interpreted as query syntax. Hits are ranked by bm25 with ties broken by
//! identifier. Facets cover the whole match set, ignoring both the year
//! filter and paging; `meta.total` honors the year filter.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::config::{Config, SearchConfig};
use crate::db;
use crate::error::SearchError;
use crate::models::{SearchHit, SearchMeta, SearchQuery, SearchResult};
use crate::snippet::{self, SnippetOptions};
use crate::store::{ItemStore, SqliteItemStore};

/// Lower-cased alphanumeric terms of `query`.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// FTS5 expression matching items that contain every term, or `None` when
/// the query has no usable terms.
pub fn to_match_expression(query: &str) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

/// Run one search against `store`.
///
/// Only rejects structurally impossible paging; callers enforce their own
/// limit cap (see [`SearchService`]).
pub async fn search(
    store: &dyn ItemStore,
    query: &SearchQuery,
    opts: &SnippetOptions,
) -> Result<SearchResult, SearchError> {
    if query.limit < 1 {
        return Err(SearchError::InvalidParameter(format!(
            "limit must be positive, got {}",
            query.limit
        )));
    }
    if query.page < 0 {
        return Err(SearchError::InvalidParameter(format!(
            "page must not be negative, got {}",
            query.page
        )));
    }

    let Some(expr) = to_match_expression(&query.query) else {
        return Ok(SearchResult::empty(query));
    };
    let terms = query_terms(&query.query);
    let offset = query.page.checked_mul(query.limit).ok_or_else(|| {
        SearchError::InvalidParameter(format!("page {} is out of range", query.page))
    })?;

    let rows = store
        .search_ranked(&expr, query.year, query.limit, offset)
        .await?;
    let total = store.count_matches(&expr, query.year).await?;
    let years = store.year_facet(&expr).await?;
    let collections = store.collection_facet(&expr).await?;

    let results: Vec<SearchHit> = rows
        .into_iter()
        .map(|row| SearchHit {
            snippets: snippet::snippets(&row.full_text, &terms, opts),
            id: row.id,
            collection: row.collection,
            title: row.title,
            date: row.date,
            year: row.year,
            score: row.score,
        })
        .collect();

    debug!(
        query = %query.query,
        expr = %expr,
        total,
        returned = results.len(),
        "search"
    );

    Ok(SearchResult {
        query: query.query.clone(),
        meta: SearchMeta {
            total,
            page: query.page,
            limit: query.limit,
            returned: results.len(),
        },
        results,
        years,
        collections,
    })
}

/// Search bound to a store and the configured limits.
#[derive(Clone)]
pub struct SearchService {
    store: Arc<dyn ItemStore>,
    snippet: SnippetOptions,
    default_limit: i64,
    max_limit: i64,
}

impl SearchService {
    pub fn new(store: Arc<dyn ItemStore>, config: &SearchConfig) -> Self {
        Self {
            store,
            snippet: SnippetOptions::from(config),
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }

    pub fn default_limit(&self) -> i64 {
        self.default_limit
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult, SearchError> {
        if query.limit < 1 || query.limit > self.max_limit {
            return Err(SearchError::InvalidParameter(format!(
                "limit must be between 1 and {}, got {}",
                self.max_limit, query.limit
            )));
        }
        search(self.store.as_ref(), query, &self.snippet).await
    }
}

/// CLI entry point for `archivist search`.
pub async fn run_search(
    config: &Config,
    query: &str,
    year: Option<i32>,
    limit: Option<i64>,
    page: i64,
    json: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let service = SearchService::new(Arc::new(SqliteItemStore::new(pool.clone())), &config.search);

    let request = SearchQuery {
        query: query.to_string(),
        year,
        limit: limit.unwrap_or(service.default_limit()),
        page,
    };
    let result = service.search(&request).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let first = request.offset() + 1;
    for (i, hit) in result.results.iter().enumerate() {
        println!("{}. [{:.2}] {} / {}", first + i as i64, -hit.score, hit.collection, hit.title);
        println!("    date: {}", hit.date);
        println!("    id: {}", hit.id);
        for s in &hit.snippets {
            println!("    excerpt: \"{}\"", s.trim());
        }
        println!();
    }

    println!(
        "{} of {} matches (page {}, limit {})",
        result.meta.returned, result.meta.total, result.meta.page, result.meta.limit
    );
    if !result.years.is_empty() {
        let years: Vec<String> = result
            .years
            .iter()
            .map(|(y, n)| format!("{}:{}", y, n))
            .collect();
        println!("years: {}", years.join(" "));
    }
    if !result.collections.is_empty() {
        let collections: Vec<String> = result
            .collections
            .iter()
            .map(|(c, n)| format!("{}:{}", c, n))
            .collect();
        println!("collections: {}", collections.join(" "));
    }

    Ok(())
}
