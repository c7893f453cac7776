//! Catalog client: paginated enumeration of a collection's identifiers.
//!
//! Pages are requested from the catalog's advanced-search endpoint, sorted
//! by item date so the page boundaries are stable between runs:
//!
//! ```text
//! GET {base_url}/advancedsearch.php?q=collection:<name>&fl[]=identifier
//!     &sort[]=date asc&rows=<page_size>&page=<n>&output=json
//! ```
//!
//! Enumeration stops after page `n` once `numFound < page_size * n`. A page
//! with no documents also ends enumeration, so an inconsistent `numFound`
//! cannot loop forever. Each page is an independent request; there is no
//! resume point, and a restarted harvest begins again at page 1.

use serde::Deserialize;
use tracing::debug;

use crate::config::HarvestConfig;
use crate::error::CatalogError;
use crate::http;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub response: SearchBody,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
pub struct SearchDoc {
    pub identifier: String,
}

/// One page of a collection listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPage {
    /// 1-based page number.
    pub page: u32,
    pub num_found: u64,
    pub identifiers: Vec<String>,
}

pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
    max_retries: u32,
}

impl CatalogClient {
    pub fn new(client: reqwest::Client, config: &HarvestConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            max_retries: config.max_retries,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn search_url(&self, collection: &str, page: u32) -> Result<reqwest::Url, CatalogError> {
        let endpoint = format!("{}/advancedsearch.php", self.base_url);
        let query = format!("collection:{}", collection);
        let rows = self.page_size.to_string();
        let page = page.to_string();
        reqwest::Url::parse_with_params(
            &endpoint,
            &[
                ("q", query.as_str()),
                ("fl[]", "identifier"),
                ("sort[]", "date asc"),
                ("rows", rows.as_str()),
                ("page", page.as_str()),
                ("output", "json"),
            ],
        )
        .map_err(|e| CatalogError::InvalidUrl(format!("{}: {}", endpoint, e)))
    }

    /// Fetch a single page (1-based) of a collection listing.
    pub async fn fetch_page(&self, collection: &str, page: u32) -> Result<CatalogPage, CatalogError> {
        let url = self.search_url(collection, page)?;
        let body = http::get_bytes(&self.client, url.as_str(), self.max_retries).await?;
        let parsed = parse_search_response(collection, &body)?;

        debug!(
            collection,
            page,
            num_found = parsed.response.num_found,
            docs = parsed.response.docs.len(),
            "catalog page"
        );

        Ok(CatalogPage {
            page,
            num_found: parsed.response.num_found,
            identifiers: parsed
                .response
                .docs
                .into_iter()
                .map(|d| d.identifier)
                .collect(),
        })
    }

    /// Lazily enumerate a collection, one page per [`CollectionPager::next_page`].
    pub fn list_collection(&self, collection: &str) -> CollectionPager<'_> {
        CollectionPager {
            client: self,
            collection: collection.to_string(),
            next: 1,
            done: false,
        }
    }
}

pub fn parse_search_response(collection: &str, body: &[u8]) -> Result<SearchResponse, CatalogError> {
    serde_json::from_slice(body).map_err(|source| CatalogError::Decode {
        collection: collection.to_string(),
        source,
    })
}

/// True when page `page` is the last one for a listing of `num_found` items.
pub fn is_last_page(num_found: u64, page_size: u32, page: u32) -> bool {
    num_found < u64::from(page_size) * u64::from(page)
}

/// Page-at-a-time cursor over one collection.
pub struct CollectionPager<'a> {
    client: &'a CatalogClient,
    collection: String,
    next: u32,
    done: bool,
}

impl CollectionPager<'_> {
    /// Fetch the next page, or `None` once the listing is exhausted.
    ///
    /// An error leaves the pager positioned on the failed page.
    pub async fn next_page(&mut self) -> Result<Option<CatalogPage>, CatalogError> {
        if self.done {
            return Ok(None);
        }

        let page = self.client.fetch_page(&self.collection, self.next).await?;
        if page.identifiers.is_empty()
            || is_last_page(page.num_found, self.client.page_size, page.page)
        {
            self.done = true;
        }
        self.next += 1;
        Ok(Some(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> CatalogClient {
        let config = HarvestConfig {
            base_url: base_url.to_string(),
            page_size: 100,
            ..HarvestConfig::default()
        };
        CatalogClient::new(reqwest::Client::new(), &config)
    }

    #[test]
    fn test_stop_rule() {
        assert!(is_last_page(0, 100, 1));
        assert!(is_last_page(99, 100, 1));
        assert!(!is_last_page(100, 100, 1));
        assert!(!is_last_page(150, 100, 1));
        assert!(is_last_page(150, 100, 2));
        // Exactly full pages need one more (empty) request to terminate.
        assert!(!is_last_page(200, 100, 2));
        assert!(is_last_page(200, 100, 3));
    }

    #[test]
    fn test_search_url_parameters() {
        let url = client("https://archive.example/").search_url("lambda", 3).unwrap();
        assert_eq!(url.path(), "/advancedsearch.php");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("q".into(), "collection:lambda".into())));
        assert!(pairs.contains(&("fl[]".into(), "identifier".into())));
        assert!(pairs.contains(&("sort[]".into(), "date asc".into())));
        assert!(pairs.contains(&("rows".into(), "100".into())));
        assert!(pairs.contains(&("page".into(), "3".into())));
        assert!(pairs.contains(&("output".into(), "json".into())));
    }

    #[test]
    fn test_invalid_base_url() {
        let err = client("not a url").search_url("c", 1).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidUrl(_)));
    }

    #[test]
    fn test_parse_search_response() {
        let body = br#"{"responseHeader":{"status":0},
            "response":{"numFound":2,"start":0,
            "docs":[{"identifier":"a1"},{"identifier":"b2"}]}}"#;
        let parsed = parse_search_response("c", body).unwrap();
        assert_eq!(parsed.response.num_found, 2);
        let ids: Vec<_> = parsed.response.docs.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b2"]);
    }

    #[test]
    fn test_parse_empty_collection() {
        let parsed = parse_search_response("c", br#"{"response":{"numFound":0}}"#).unwrap();
        assert_eq!(parsed.response.num_found, 0);
        assert!(parsed.response.docs.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_response() {
        let err = parse_search_response("c", br#"{"error":"bad"}"#).unwrap_err();
        assert!(matches!(err, CatalogError::Decode { .. }));
    }
}
