//! Error taxonomy for the harvest pipeline and the query service.
//!
//! Library-level failures are typed so callers can tell a degraded field
//! from a dropped item from a bad request. The CLI and config layers use
//! `anyhow` on top of these.

use thiserror::Error;

use crate::cache::ArtifactKind;

/// Artifact cache failures.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("invalid identifier {0:?}: must be non-empty and free of path separators")]
    InvalidIdentifier(String),

    #[error("cache I/O error for {kind} artifact {id}: {source}")]
    Io {
        kind: ArtifactKind,
        id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Remote fetch failures.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Failure of a cache-then-fetch lookup.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Catalog listing failures.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("invalid catalog URL {0}")]
    InvalidUrl(String),

    #[error("malformed search response for collection {collection}: {source}")]
    Decode {
        collection: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures that stop a single item from being fetched at all.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Index loader failures. Both are per-item and never abort a batch.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("item {0} has no full text; not indexed")]
    MissingText(String),

    #[error("store write failed for {id}: {source}")]
    Store {
        id: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Query service failures.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("store query failed: {0}")]
    Store(#[from] sqlx::Error),
}
